//! Tolerant extraction of a `PrescriptionRecord` from advice text.
//!
//! The advice service is asked for XML-like markup but nothing guarantees it
//! complies, so this is a scanner rather than a document parser: it walks the
//! text once, recognizes `<name>` / `</name>` tags by exact name, and pairs
//! each open tag with the nearest matching close tag after it. Anything it
//! cannot pair is ignored. Parsing never fails; the worst case is a record
//! made entirely of sentinels.
//!
//! `<point>` pairs are advice wherever they appear, except inside a
//! `<medication>` block that is actually closed: those belong to the
//! medication and are left out of the advice list.

use crate::models::{
    Medication, PrescriptionRecord, NOT_SPECIFIED, NO_INSTRUCTIONS, UNKNOWN_CONDITION,
};

const DISEASE_NAME: &str = "diseaseName";
const MEDICATION: &str = "medication";
const MEDICINE_NAME: &str = "medicineName";
const DOSAGE: &str = "dosage";
const FREQUENCY: &str = "frequency";
const DURATION: &str = "duration";
const SPECIAL_INSTRUCTIONS: &str = "specialInstructions";
const POINT: &str = "point";

/// Parse advice text into a prescription record. Total over all inputs.
pub fn parse_prescription(raw: &str) -> PrescriptionRecord {
    let mut builder = RecordBuilder::new(raw);
    for tag in TagScanner::new(raw) {
        builder.feed(tag);
    }
    let record = builder.finish();

    tracing::debug!(
        input_len = raw.len(),
        known_disease = record.has_known_disease(),
        medications = record.medications.len(),
        advice_points = record.advice.len(),
        "Parsed prescription text"
    );

    record
}

// ─── Tag scanning ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Open,
    Close,
}

/// A recognized tag. `start` is the byte offset of `<`, `end` one past `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag<'a> {
    name: &'a str,
    kind: TagKind,
    start: usize,
    end: usize,
}

/// Yields open and close tags in source order, skipping comments,
/// self-closing tags, and `<` characters that do not start a tag.
struct TagScanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> TagScanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for TagScanner<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Tag<'a>> {
        loop {
            let start = self.pos + self.text.get(self.pos..)?.find('<')?;
            let rest = &self.text[start..];

            if let Some(comment) = rest.strip_prefix("<!--") {
                self.pos = match comment.find("-->") {
                    Some(i) => start + 4 + i + 3,
                    None => self.text.len(),
                };
                continue;
            }

            match read_tag(self.text, start) {
                Some(tag) => {
                    self.pos = tag.end;
                    return Some(tag);
                }
                None => self.pos = start + 1,
            }
        }
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b':' | b'.')
}

/// Read the tag starting at `text[start] == '<'`, if it is one.
fn read_tag(text: &str, start: usize) -> Option<Tag<'_>> {
    let bytes = text.as_bytes();
    let mut i = start + 1;

    let kind = if bytes.get(i) == Some(&b'/') {
        i += 1;
        TagKind::Close
    } else {
        TagKind::Open
    };

    let name_start = i;
    if !bytes.get(i).is_some_and(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    while bytes.get(i).is_some_and(|&b| is_name_byte(b)) {
        i += 1;
    }
    let name = &text[name_start..i];

    // A '<' before the closing '>' means this was not a tag after all.
    let gt = i + text[i..].find(|c: char| c == '>' || c == '<')?;
    if bytes[gt] != b'>' {
        return None;
    }

    let between = &text[i..gt];
    let well_formed = match kind {
        TagKind::Close => between.trim().is_empty(),
        // Attributes are tolerated; self-closing tags carry no content.
        TagKind::Open => {
            between.is_empty()
                || (between.starts_with(char::is_whitespace) && !between.trim_end().ends_with('/'))
        }
    };

    well_formed.then_some(Tag {
        name,
        kind,
        start,
        end: gt + 1,
    })
}

// ─── Record building ──────────────────────────────────────────────────────────

/// First `<name>…</name>` pair of one tag name. Later pairs are ignored.
#[derive(Debug, Default)]
struct FirstMatch {
    content_start: Option<usize>,
    value: Option<String>,
}

impl FirstMatch {
    fn open(&mut self, content_start: usize) {
        if self.value.is_none() && self.content_start.is_none() {
            self.content_start = Some(content_start);
        }
    }

    fn close(&mut self, text: &str, content_end: usize) {
        if let Some(start) = self.content_start.take() {
            if self.value.is_none() {
                self.value = Some(clean_inner_text(&text[start..content_end]));
            }
        }
    }

    fn or(self, default: &str) -> String {
        self.value
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Fields of the `<medication>` span currently open.
#[derive(Debug, Default)]
struct MedicationDraft {
    name: FirstMatch,
    dosage: FirstMatch,
    frequency: FirstMatch,
    duration: FirstMatch,
    special_instructions: FirstMatch,
}

impl MedicationDraft {
    fn field(&mut self, name: &str) -> Option<&mut FirstMatch> {
        match name {
            MEDICINE_NAME => Some(&mut self.name),
            DOSAGE => Some(&mut self.dosage),
            FREQUENCY => Some(&mut self.frequency),
            DURATION => Some(&mut self.duration),
            SPECIAL_INSTRUCTIONS => Some(&mut self.special_instructions),
            _ => None,
        }
    }

    fn finish(self) -> Medication {
        Medication {
            name: self.name.or(NOT_SPECIFIED),
            dosage: self.dosage.or(NOT_SPECIFIED),
            frequency: self.frequency.or(NOT_SPECIFIED),
            duration: self.duration.or(NOT_SPECIFIED),
            special_instructions: self.special_instructions.or(NO_INSTRUCTIONS),
        }
    }
}

struct RecordBuilder<'a> {
    text: &'a str,
    disease_name: FirstMatch,
    /// Some while inside a `<medication>` span.
    medication: Option<MedicationDraft>,
    medications: Vec<Medication>,
    point_start: Option<usize>,
    /// Points seen since the open medication span began.
    pending_points: Vec<String>,
    advice: Vec<String>,
}

impl<'a> RecordBuilder<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            disease_name: FirstMatch::default(),
            medication: None,
            medications: Vec::new(),
            point_start: None,
            pending_points: Vec::new(),
            advice: Vec::new(),
        }
    }

    fn feed(&mut self, tag: Tag<'_>) {
        match (tag.name, tag.kind) {
            (DISEASE_NAME, TagKind::Open) => self.disease_name.open(tag.end),
            (DISEASE_NAME, TagKind::Close) => self.disease_name.close(self.text, tag.start),

            (MEDICATION, TagKind::Open) => {
                if self.medication.is_none() {
                    self.medication = Some(MedicationDraft::default());
                    // A point cannot span into a medication block.
                    self.point_start = None;
                }
            }
            (MEDICATION, TagKind::Close) => {
                if let Some(draft) = self.medication.take() {
                    self.medications.push(draft.finish());
                    // Points inside a closed medication block are not advice.
                    self.pending_points.clear();
                }
            }

            (POINT, TagKind::Open) => {
                if self.point_start.is_none() {
                    self.point_start = Some(tag.end);
                }
            }
            (POINT, TagKind::Close) => {
                if let Some(start) = self.point_start.take() {
                    let point = clean_inner_text(&self.text[start..tag.start]);
                    if point.is_empty() {
                        return;
                    }
                    if self.medication.is_some() {
                        self.pending_points.push(point);
                    } else {
                        self.advice.push(point);
                    }
                }
            }

            (name, kind) => {
                let text = self.text;
                if let Some(field) = self.medication.as_mut().and_then(|d| d.field(name)) {
                    match kind {
                        TagKind::Open => field.open(tag.end),
                        TagKind::Close => field.close(text, tag.start),
                    }
                }
            }
        }
    }

    /// Unclosed spans at end of input are dropped. An unclosed medication
    /// span is not a block, so the points seen after it still count.
    fn finish(mut self) -> PrescriptionRecord {
        self.advice.append(&mut self.pending_points);
        PrescriptionRecord {
            disease_name: self.disease_name.or(UNKNOWN_CONDITION),
            medications: self.medications,
            advice: self.advice,
        }
    }
}

/// Trim and decode the predefined XML entities.
fn clean_inner_text(inner: &str) -> String {
    let trimmed = inner.trim();
    if !trimmed.contains('&') {
        return trimmed.to_string();
    }
    trimmed
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
