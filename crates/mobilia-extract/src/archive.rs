//! Embedded image extraction from office-container archives.
//!
//! Office formats (xlsx, docx) are zip containers with media stored
//! under well-known paths. Those paths are scanned first; when they
//! yield nothing, a full-archive scan catches containers with unusual
//! layouts. For spreadsheets, drawing XML resolves each image to the
//! zero-based row it is anchored on, converted here to the 1-based row
//! number the rest of the pipeline uses.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};
use zip::ZipArchive;

use mobilia_core::{EmbeddedImage, Result};

/// Media directories checked before falling back to a full scan.
const KNOWN_MEDIA_DIRS: &[&str] = &["xl/media/", "word/media/", "ppt/media/"];

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// Extract every embedded raster image from the source file.
///
/// A source that is not a zip container, or contains no images, yields
/// an empty list rather than an error.
pub fn extract_images(data: &[u8]) -> Result<Vec<EmbeddedImage>> {
    let mut archive = match ZipArchive::new(Cursor::new(data)) {
        Ok(archive) => archive,
        Err(e) => {
            debug!(
                component = "archive",
                error = %e,
                "Source is not an archive container, no embedded images"
            );
            return Ok(Vec::new());
        }
    };

    let names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();

    let mut media_names: Vec<String> = names
        .iter()
        .filter(|n| KNOWN_MEDIA_DIRS.iter().any(|dir| n.starts_with(dir)))
        .filter(|n| is_image_name(n))
        .cloned()
        .collect();

    let full_scan = media_names.is_empty();
    if full_scan {
        media_names = names
            .iter()
            .filter(|n| !n.ends_with('/') && is_image_name(n))
            .cloned()
            .collect();
    }

    let anchors = resolve_drawing_anchors(&mut archive, &names);

    let mut images = Vec::new();
    for name in &media_names {
        let mut entry = archive.by_name(name)?;
        let mut payload = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut payload)?;

        let (anchor, sheet_or_page) = match anchors.get(name) {
            Some((row0, sheet)) => (row0 + 1, sheet.clone()),
            None if full_scan => (0, "archive".to_string()),
            None if name.starts_with("word/media/") || name.starts_with("ppt/media/") => {
                (0, "document".to_string())
            }
            None => (0, "workbook".to_string()),
        };

        images.push(EmbeddedImage {
            data: payload,
            anchor,
            sheet_or_page,
            extension: extension_of(name),
        });
    }

    debug!(
        component = "archive",
        image_count = images.len(),
        full_scan,
        "Embedded images extracted"
    );
    Ok(images)
}

fn is_image_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(&format!(".{}", ext)))
}

fn extension_of(name: &str) -> String {
    name.rsplit('.').next().unwrap_or_default().to_lowercase()
}

/// Map media path → (zero-based anchor row, sheet label) from the
/// spreadsheet drawing XML.
fn resolve_drawing_anchors(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    names: &[String],
) -> HashMap<String, (u32, String)> {
    let mut anchors = HashMap::new();

    let drawing_names: Vec<String> = names
        .iter()
        .filter(|n| n.starts_with("xl/drawings/drawing") && n.ends_with(".xml"))
        .cloned()
        .collect();

    for drawing_name in drawing_names {
        let Some(xml) = read_entry_string(archive, &drawing_name) else {
            continue;
        };
        let embeds = parse_drawing(&xml);
        if embeds.is_empty() {
            continue;
        }

        let base = drawing_name
            .rsplit('/')
            .next()
            .unwrap_or(&drawing_name)
            .to_string();
        let rels_name = format!("xl/drawings/_rels/{}.rels", base);
        let Some(rels_xml) = read_entry_string(archive, &rels_name) else {
            warn!(
                component = "archive",
                drawing = %drawing_name,
                "Drawing has anchors but no relationships part"
            );
            continue;
        };
        let targets = parse_relationships(&rels_xml);
        let sheet_label = sheet_label_for(&base);

        for (rel_id, row0) in embeds {
            let Some(target) = targets.get(&rel_id) else {
                continue;
            };
            let media_path = normalize_target(target);
            anchors
                .entry(media_path)
                .or_insert((row0, sheet_label.clone()));
        }
    }

    anchors
}

fn read_entry_string(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml).ok()?;
    Some(xml)
}

/// Parse a drawing part into (relationship id, zero-based from-row)
/// pairs, in document order.
fn parse_drawing(xml: &str) -> Vec<(String, u32)> {
    let mut reader = Reader::from_str(xml);
    let mut embeds = Vec::new();

    let mut in_from = false;
    let mut in_row = false;
    let mut current_row: Option<u32> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"from" => in_from = true,
                b"row" if in_from => in_row = true,
                b"blip" => {
                    if let Some(rel_id) = embed_attribute(e) {
                        embeds.push((rel_id, current_row.unwrap_or(0)));
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() == b"blip" {
                    if let Some(rel_id) = embed_attribute(e) {
                        embeds.push((rel_id, current_row.unwrap_or(0)));
                    }
                }
            }
            Ok(Event::Text(ref t)) if in_row => {
                if let Ok(text) = t.unescape() {
                    current_row = text.trim().parse().ok();
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"from" => in_from = false,
                b"row" => in_row = false,
                // One anchor per image; reset for the next one.
                b"twoCellAnchor" | b"oneCellAnchor" | b"absoluteAnchor" => current_row = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!(component = "archive", error = %e, "Malformed drawing XML");
                break;
            }
            _ => {}
        }
    }

    embeds
}

fn embed_attribute(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == b"embed" {
            return Some(String::from_utf8_lossy(&attr.value).to_string());
        }
    }
    None
}

/// Parse a relationships part into an Id → Target map.
fn parse_relationships(xml: &str) -> HashMap<String, String> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if e.local_name().as_ref() != b"Relationship" {
                    continue;
                }
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => {
                            target = Some(String::from_utf8_lossy(&attr.value).to_string())
                        }
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    targets
}

/// Resolve a relationship target like "../media/image1.png" to its
/// archive path.
fn normalize_target(target: &str) -> String {
    if let Some(rest) = target.strip_prefix("../") {
        format!("xl/{}", rest)
    } else if let Some(rest) = target.strip_prefix('/') {
        rest.to_string()
    } else {
        format!("xl/drawings/{}", target)
    }
}

/// "drawing1.xml" → "sheet1"; anchors keep a stable sheet label even
/// without parsing the workbook relationships.
fn sheet_label_for(drawing_base: &str) -> String {
    let digits: String = drawing_base.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        "sheet".to_string()
    } else {
        format!("sheet{}", digits)
    }
}
