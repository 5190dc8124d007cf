//! Tesseract TSV output parsing
//!
//! Columns: level, page_num, block_num, par_num, line_num, word_num, left,
//! top, width, height, conf, text. Only word rows (level 5) are detections;
//! page, block, paragraph and line rows carry no text.

use crate::engine::{BoundingBox, Confidence, Detection, DetectionRecord};

const COLUMNS: usize = 12;
const WORD_LEVEL: u32 = 5;

/// Parse TSV into detection records in reading order.
///
/// A malformed record's index is its position among the returned records,
/// not its TSV line number.
pub fn parse(tsv: &str) -> Vec<DetectionRecord> {
    let mut records = Vec::new();
    for line in tsv
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with("level"))
    {
        if let Some(record) = parse_row(records.len(), line) {
            records.push(record);
        }
    }
    records
}

fn parse_row(index: usize, line: &str) -> Option<DetectionRecord> {
    let malformed = |reason: String| {
        Some(DetectionRecord::Malformed {
            index,
            raw: line.to_string(),
            reason,
        })
    };

    // The text column may itself contain tabs
    let fields: Vec<&str> = line.splitn(COLUMNS, '\t').collect();
    if fields.len() < COLUMNS {
        return malformed(format!(
            "expected {} columns, found {}",
            COLUMNS,
            fields.len()
        ));
    }

    let level = match fields[0].trim().parse::<u32>() {
        Ok(level) => level,
        Err(_) => return malformed(format!("invalid level '{}'", fields[0])),
    };
    if level != WORD_LEVEL {
        return None;
    }

    let text = fields[11].trim();
    if text.is_empty() {
        return None;
    }

    let mut geometry = [0u32; 4];
    for (slot, field) in geometry.iter_mut().zip(&fields[6..10]) {
        match field.trim().parse::<u32>() {
            Ok(value) => *slot = value,
            Err(_) => return malformed(format!("invalid box coordinate '{}'", field)),
        }
    }

    let conf = match fields[10].trim().parse::<f32>() {
        Ok(conf) if (0.0..=100.0).contains(&conf) => conf,
        Ok(conf) => return malformed(format!("confidence {} out of range", conf)),
        Err(_) => return malformed(format!("invalid confidence '{}'", fields[10])),
    };

    let [left, top, width, height] = geometry;
    Some(DetectionRecord::Detection(Detection {
        bbox: Some(BoundingBox {
            left,
            top,
            width,
            height,
        }),
        text: text.to_string(),
        confidence: Confidence::from_percent(conf),
    }))
}
