use std::fs;
use std::io::{Cursor, Read, stdin};
use std::path::Path;

use anyhow::Context;
use chipreplay::trace::{PlaybackInterpreter, TraceBuffer, TraceEvent};
use comfy_table::{Cell, ContentArrangement, Table, presets::NOTHING};
use flate2::read::GzDecoder;

/// Read trace bytes from a path or stdin ('-').
///
/// Gzip input is detected by a `.gz`/`.s9z` extension or by the gzip magic
/// bytes (0x1F 0x8B) and decompressed.
pub fn load_bytes_from_path(path: &Path) -> anyhow::Result<Vec<u8>> {
    let data = if path == Path::new("-") {
        let mut inbuf = Vec::new();
        stdin()
            .read_to_end(&mut inbuf)
            .context("failed to read from stdin")?;
        inbuf
    } else {
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?
    };

    let is_gzip = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("gz") || s.eq_ignore_ascii_case("s9z"))
        .unwrap_or(false)
        || (data.len() >= 2 && data[0] == 0x1F && data[1] == 0x8B);

    if is_gzip {
        let mut decoder = GzDecoder::new(Cursor::new(data));
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .context("gzip decompression failed")?;
        Ok(out)
    } else {
        Ok(data)
    }
}

/// Load and validate a trace.
pub fn load_trace(path: &Path) -> anyhow::Result<TraceBuffer> {
    let bytes = load_bytes_from_path(path)?;
    TraceBuffer::parse(bytes).with_context(|| format!("failed to parse trace: {}", path.display()))
}

/// Key/value summary of the header, devices and tags.
fn summarize(trace: &TraceBuffer) -> Vec<(String, String)> {
    let h = trace.header();
    let rate = h.tick_rate();
    let mut rows = vec![
        ("Version".to_string(), (h.version as char).to_string()),
        (
            "Timer".to_string(),
            format!(
                "{}/{} s per tick ({:.3} Hz)",
                rate.numerator,
                rate.denominator,
                f64::from(rate.denominator) / f64::from(rate.numerator)
            ),
        ),
        ("Size".to_string(), format!("{} bytes", trace.len())),
        (
            "Event data".to_string(),
            format!("0x{:08X}", h.event_data_offset),
        ),
        (
            "Loop point".to_string(),
            match h.loop_point() {
                Some(off) => format!("0x{:08X}", off),
                None => "(none)".to_string(),
            },
        ),
    ];

    let devices = if h.devices.is_empty() {
        "(default)".to_string()
    } else {
        h.devices
            .iter()
            .map(|d| format!("{:<16} {} Hz", d.kind.name(), d.clock))
            .collect::<Vec<_>>()
            .join("\n")
    };
    rows.push(("Devices".to_string(), devices));

    if let Some(tags) = trace.tags() {
        for (k, v) in tags.entries {
            rows.push((format!("Tag {}", k), v));
        }
    }
    rows
}

/// Walk one playthrough and total its events.
fn measure(trace: &TraceBuffer) -> anyhow::Result<(u64, u64, u64)> {
    let mut interp = PlaybackInterpreter::new(trace);
    interp.set_loop_count(Some(1));
    let (mut writes, mut ticks) = (0u64, 0u64);
    for event in interp.by_ref() {
        match event? {
            TraceEvent::Write(_) => writes += 1,
            TraceEvent::Delay { ticks: t } => ticks += u64::from(t),
            TraceEvent::Loop { .. } | TraceEvent::End => {}
        }
    }
    Ok((writes, ticks, interp.unknown_opcodes()))
}

pub fn info(path: &Path, trace: &TraceBuffer) -> anyhow::Result<()> {
    let mut rows = summarize(trace);
    let (writes, ticks, unknown) = measure(trace)?;
    let rate = trace.header().tick_rate();
    let seconds = ticks as f64 * f64::from(rate.numerator) / f64::from(rate.denominator);
    rows.push(("Writes".to_string(), writes.to_string()));
    rows.push(("Ticks".to_string(), format!("{} ({:.3} s)", ticks, seconds)));
    if unknown > 0 {
        rows.push(("Unknown opcodes".to_string(), unknown.to_string()));
    }

    println!("=== Trace: {} ===", path.display());
    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Field"), Cell::new("Value")]);
    for (k, v) in rows {
        table.add_row(vec![Cell::new(k), Cell::new(v)]);
    }
    println!("{table}");
    Ok(())
}

/// Print one line per event with its stream offset.
pub fn dump(trace: &TraceBuffer, loops: u32) -> anyhow::Result<()> {
    let mut interp = PlaybackInterpreter::new(trace);
    interp.set_loop_count(Some(loops.max(1)));
    println!("{:<10} Event", "Offset");
    println!("{}", "-".repeat(40));
    while let Some(event) = interp.next_event()? {
        let line = match event {
            TraceEvent::Write(w) => format!("write  0x{:02X} = 0x{:02X}", w.address, w.value),
            TraceEvent::Delay { ticks } => format!("delay  {} tick(s)", ticks),
            TraceEvent::Loop { offset, iteration } => {
                format!("loop   #{} -> 0x{:08X}", iteration, offset)
            }
            TraceEvent::End => "end".to_string(),
        };
        println!("0x{:08X} {}", interp.event_offset(), line);
    }
    Ok(())
}
