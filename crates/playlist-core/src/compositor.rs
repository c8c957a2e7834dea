//! Burn annotations into PDF page content
//!
//! Marks are drawn into a new content stream appended to each touched page,
//! so the original page content is left byte-for-byte intact. Crops rewrite
//! the page's `/CropBox`.

use crate::annotation::{Annotation, Color, HIGHLIGHT_OPACITY};
use crate::coords::{rect_to_document_space, text_anchor_to_document_space, to_document_space};
use crate::document::{inherited_attribute, page_box, page_ids, resolve_dict, PageBox};
use crate::error::PlaylistError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;

const FONT_RESOURCE: &str = "PlF1";
const HIGHLIGHT_GSTATE: &str = "PlGS1";

/// Apply annotations to a PDF held in memory, returning the serialized result.
///
/// With no annotations the input bytes are returned unchanged.
pub fn apply_to_bytes(
    pdf_bytes: &[u8],
    annotations: &[Annotation],
) -> Result<Vec<u8>, PlaylistError> {
    if annotations.is_empty() {
        return Ok(pdf_bytes.to_vec());
    }

    let doc = Document::load_mem(pdf_bytes).map_err(|e| PlaylistError::ParseError(e.to_string()))?;
    let mut annotated = apply_annotations(&doc, annotations)?;

    let mut output = Vec::new();
    annotated
        .save_to(&mut output)
        .map_err(|e| PlaylistError::OperationError(e.to_string()))?;
    Ok(output)
}

/// Return a copy of `doc` with every annotation burned in.
///
/// Every page index is checked before anything is drawn; one bad index fails
/// the whole call and nothing is applied.
pub fn apply_annotations(
    doc: &Document,
    annotations: &[Annotation],
) -> Result<Document, PlaylistError> {
    let pages = page_ids(doc);

    if let Some(bad) = annotations.iter().find(|a| a.page() >= pages.len()) {
        return Err(PlaylistError::InvalidAnnotationTarget {
            page: bad.page(),
            page_count: pages.len(),
        });
    }

    let mut by_page: BTreeMap<usize, Vec<&Annotation>> = BTreeMap::new();
    for annotation in annotations {
        by_page.entry(annotation.page()).or_default().push(annotation);
    }

    let mut out = doc.clone();
    for (page, group) in by_page {
        let page_id = pages[page];
        let bounds = page_box(&out, page_id);
        let marks = compose_page(&mut out, page_id, bounds, &group)?;
        tracing::debug!(page, annotations = group.len(), marks, "composed page");
    }

    tracing::info!(
        annotations = annotations.len(),
        pages = pages.len(),
        "applied annotations"
    );
    Ok(out)
}

/// Draw one page's annotations in order. Returns how many drawing marks were
/// emitted (crops and degenerate strokes are not counted).
fn compose_page(
    doc: &mut Document,
    page_id: ObjectId,
    bounds: PageBox,
    group: &[&Annotation],
) -> Result<usize, PlaylistError> {
    let height = bounds.height();
    let mut ops = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];
    let mut marks = 0;
    let mut needs_font = false;
    let mut needs_gstate = false;

    for annotation in group {
        match annotation {
            Annotation::Stroke {
                points,
                color,
                width,
                ..
            } => {
                if points.len() < 2 {
                    continue;
                }
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new("w", vec![real(*width)]));
                ops.push(Operation::new("J", vec![Object::Integer(1)]));
                ops.push(Operation::new("j", vec![Object::Integer(1)]));
                ops.push(Operation::new("RG", rgb(color)));
                for (i, point) in points.iter().enumerate() {
                    let p = to_document_space(*point, height);
                    let op = if i == 0 { "m" } else { "l" };
                    ops.push(Operation::new(
                        op,
                        vec![real(p.x + bounds.llx), real(p.y + bounds.lly)],
                    ));
                }
                ops.push(Operation::new("S", vec![]));
                ops.push(Operation::new("Q", vec![]));
                marks += 1;
            }
            Annotation::Highlight { rect, color, .. } => {
                let rect = rect_to_document_space(*rect, height);
                ops.push(Operation::new("q", vec![]));
                ops.push(Operation::new(
                    "gs",
                    vec![Object::Name(HIGHLIGHT_GSTATE.as_bytes().to_vec())],
                ));
                ops.push(Operation::new("rg", rgb(color)));
                ops.push(Operation::new(
                    "re",
                    vec![
                        real(rect.x + bounds.llx),
                        real(rect.y + bounds.lly),
                        real(rect.width),
                        real(rect.height),
                    ],
                ));
                ops.push(Operation::new("f", vec![]));
                ops.push(Operation::new("Q", vec![]));
                needs_gstate = true;
                marks += 1;
            }
            Annotation::Text {
                anchor,
                text,
                font_size,
                color,
                ..
            } => {
                let origin = text_anchor_to_document_space(*anchor, *font_size, height);
                ops.push(Operation::new("BT", vec![]));
                ops.push(Operation::new(
                    "Tf",
                    vec![
                        Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                        real(*font_size),
                    ],
                ));
                ops.push(Operation::new("rg", rgb(color)));
                ops.push(Operation::new(
                    "Td",
                    vec![real(origin.x + bounds.llx), real(origin.y + bounds.lly)],
                ));
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::String(win_ansi(text), StringFormat::Literal)],
                ));
                ops.push(Operation::new("ET", vec![]));
                needs_font = true;
                marks += 1;
            }
            Annotation::Crop { rect, .. } => {
                let rect = rect_to_document_space(*rect, height);
                if rect.width <= 0.0 || rect.height <= 0.0 {
                    continue;
                }
                let x = rect.x + bounds.llx;
                let y = rect.y + bounds.lly;
                set_page_entry(
                    doc,
                    page_id,
                    "CropBox",
                    Object::Array(vec![
                        real(x),
                        real(y),
                        real(x + rect.width),
                        real(y + rect.height),
                    ]),
                )?;
            }
        }
    }

    if marks == 0 {
        return Ok(0);
    }

    if needs_font || needs_gstate {
        add_resources(doc, page_id, needs_font, needs_gstate)?;
    }
    append_content(doc, page_id, ops)?;
    Ok(marks)
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

fn rgb(color: &Color) -> Vec<Object> {
    color.components().into_iter().map(Object::Real).collect()
}

/// Encode for a WinAnsi Type1 font. Printable ASCII and U+00A0..=U+00FF
/// map to the same byte; everything else, including the C1 range that
/// WinAnsi reuses for other glyphs, becomes '?'.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            _ => b'?',
        })
        .collect()
}

fn set_page_entry(
    doc: &mut Document,
    page_id: ObjectId,
    key: &str,
    value: Object,
) -> Result<(), PlaylistError> {
    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| PlaylistError::OperationError(format!("Invalid page object: {}", e)))?;
    page.set(key, value);
    Ok(())
}

/// Give the page its own Resources dictionary containing our font and
/// graphics state. Shared or inherited resource dictionaries are copied, not
/// mutated, so other pages are unaffected.
fn add_resources(
    doc: &mut Document,
    page_id: ObjectId,
    font: bool,
    gstate: bool,
) -> Result<(), PlaylistError> {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|obj| resolve_dict(doc, &obj))
        .unwrap_or_default();

    if font {
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        insert_named_resource(doc, &mut resources, "Font", FONT_RESOURCE, font_id);
    }
    if gstate {
        let gs_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => Object::Real(HIGHLIGHT_OPACITY),
            "CA" => Object::Real(HIGHLIGHT_OPACITY),
        });
        insert_named_resource(doc, &mut resources, "ExtGState", HIGHLIGHT_GSTATE, gs_id);
    }

    set_page_entry(doc, page_id, "Resources", Object::Dictionary(resources))
}

fn insert_named_resource(
    doc: &Document,
    resources: &mut Dictionary,
    category: &str,
    name: &str,
    id: ObjectId,
) {
    let mut entries = resources
        .get(category.as_bytes())
        .ok()
        .and_then(|obj| resolve_dict(doc, obj))
        .unwrap_or_default();
    entries.set(name, Object::Reference(id));
    resources.set(category, Object::Dictionary(entries));
}

/// Wrap the existing content in `q`/`Q` and append our stream after it, so
/// a graphics state left dirty by the original content cannot leak into the
/// marks. `ops` must start by closing that wrapper.
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    mut ops: Vec<Operation>,
) -> Result<(), PlaylistError> {
    ops.push(Operation::new("Q", vec![]));
    let encoded = Content { operations: ops }
        .encode()
        .map_err(|e| PlaylistError::OperationError(format!("Failed to encode content: {}", e)))?;
    let mut data = b"\n".to_vec();
    data.extend(encoded);

    let existing = existing_contents(doc, page_id)?;
    let prefix_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let suffix_id = doc.add_object(Stream::new(Dictionary::new(), data));

    let mut contents = vec![Object::Reference(prefix_id)];
    contents.extend(existing);
    contents.push(Object::Reference(suffix_id));
    set_page_entry(doc, page_id, "Contents", Object::Array(contents))
}

/// The page's content stream references, flattening a `/Contents` that is an
/// indirect reference to an array.
fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, PlaylistError> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| PlaylistError::OperationError(format!("Invalid page object: {}", e)))?;
    let contents = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(existing)) => existing.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Point, ScreenRect};
    use crate::test_support::{create_test_pdf, create_test_pdf_with_height, page_ops};
    use pretty_assertions::assert_eq;

    fn load(bytes: &[u8]) -> Document {
        Document::load_mem(bytes).unwrap()
    }

    fn operands(op: &Operation) -> Vec<f64> {
        op.operands
            .iter()
            .map(|o| crate::document::number(o).unwrap())
            .collect()
    }

    #[test]
    fn test_empty_annotations_return_original_bytes() {
        let pdf = create_test_pdf(2, "A");
        assert_eq!(apply_to_bytes(&pdf, &[]).unwrap(), pdf);
    }

    #[test]
    fn test_highlight_rect_is_flipped_and_translucent() {
        let doc = load(&create_test_pdf_with_height(1, 300.0));
        let annotated = apply_annotations(
            &doc,
            &[Annotation::highlight(
                0,
                ScreenRect::new(10.0, 20.0, 100.0, 50.0),
                Color::YELLOW,
            )],
        )
        .unwrap();

        let ops = page_ops(&annotated, 0);
        let re = ops.iter().find(|op| op.operator == "re").unwrap();
        assert_eq!(operands(re), vec![10.0, 230.0, 100.0, 50.0]);

        let page_id = page_ids(&annotated)[0];
        let resources = resolve_dict(
            &annotated,
            annotated.get_dictionary(page_id).unwrap().get(b"Resources").unwrap(),
        )
        .unwrap();
        let gstates = resolve_dict(&annotated, resources.get(b"ExtGState").unwrap()).unwrap();
        let gs_id = gstates.get(HIGHLIGHT_GSTATE.as_bytes()).unwrap().as_reference().unwrap();
        let gs = annotated.get_dictionary(gs_id).unwrap();
        assert_eq!(crate::document::number(gs.get(b"ca").unwrap()), Some(0.3f32 as f64));
    }

    #[test]
    fn test_stroke_draws_point_count_minus_one_segments() {
        let doc = load(&create_test_pdf(1, "A"));
        let stroke = Annotation::Stroke {
            page: 0,
            points: vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(20.0, 5.0),
                Point::new(30.0, 30.0),
            ],
            color: Color::RED,
            width: 3.0,
        };
        let annotated = apply_annotations(&doc, &[stroke]).unwrap();
        let ops = page_ops(&annotated, 0);

        assert_eq!(ops.iter().filter(|op| op.operator == "m").count(), 1);
        assert_eq!(ops.iter().filter(|op| op.operator == "l").count(), 3);
        let first = ops.iter().find(|op| op.operator == "m").unwrap();
        assert_eq!(operands(first), vec![0.0, 792.0]);
        let rg = ops.iter().find(|op| op.operator == "RG").unwrap();
        assert_eq!(operands(rg), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_short_stroke_is_skipped() {
        let pdf = create_test_pdf(1, "A");
        let doc = load(&pdf);
        let stroke = Annotation::Stroke {
            page: 0,
            points: vec![Point::new(1.0, 1.0)],
            color: Color::RED,
            width: 3.0,
        };
        let annotated = apply_annotations(&doc, &[stroke]).unwrap();
        let before = page_ops(&doc, 0);
        let after = page_ops(&annotated, 0);
        assert_eq!(before.len(), after.len());
    }

    #[test]
    fn test_text_uses_fixed_font_and_baseline_transform() {
        let doc = load(&create_test_pdf(1, "A"));
        let text = Annotation::Text {
            page: 0,
            anchor: Point::new(72.0, 100.0),
            text: "Verse (2)".to_string(),
            font_size: 12.0,
            color: Color::BLACK,
        };
        let annotated = apply_annotations(&doc, &[text]).unwrap();
        let ops = page_ops(&annotated, 0);

        let tf = ops
            .iter()
            .rev()
            .find(|op| op.operator == "Tf")
            .unwrap();
        assert!(matches!(&tf.operands[0], Object::Name(name) if name == b"PlF1"));
        let td = ops.iter().rev().find(|op| op.operator == "Td").unwrap();
        assert_eq!(operands(td), vec![72.0, 704.0]);
        let tj = ops.iter().rev().find(|op| op.operator == "Tj").unwrap();
        assert_eq!(tj.operands[0].as_str().unwrap(), b"Verse (2)");
    }

    #[test]
    fn test_crop_sets_crop_box_last_one_wins() {
        let doc = load(&create_test_pdf_with_height(1, 300.0));
        let annotated = apply_annotations(
            &doc,
            &[
                Annotation::crop(0, ScreenRect::new(0.0, 0.0, 50.0, 50.0)),
                Annotation::crop(0, ScreenRect::new(10.0, 20.0, 100.0, 50.0)),
            ],
        )
        .unwrap();

        let page = annotated.get_dictionary(page_ids(&annotated)[0]).unwrap();
        let crop: Vec<f64> = page
            .get(b"CropBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| crate::document::number(o).unwrap())
            .collect();
        assert_eq!(crop, vec![10.0, 230.0, 110.0, 280.0]);
    }

    #[test]
    fn test_out_of_range_page_applies_nothing() {
        let pdf = create_test_pdf(2, "A");
        let doc = load(&pdf);
        let err = apply_annotations(
            &doc,
            &[
                Annotation::crop(0, ScreenRect::new(0.0, 0.0, 10.0, 10.0)),
                Annotation::crop(2, ScreenRect::new(0.0, 0.0, 10.0, 10.0)),
            ],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlaylistError::InvalidAnnotationTarget {
                page: 2,
                page_count: 2
            }
        ));
        let bad = [Annotation::crop(9, ScreenRect::new(0.0, 0.0, 1.0, 1.0))];
        assert!(apply_to_bytes(&pdf, &bad).is_err());
    }

    #[test]
    fn test_input_document_is_not_mutated() {
        let doc = load(&create_test_pdf(1, "A"));
        let before = doc.objects.len();
        let _ = apply_annotations(
            &doc,
            &[Annotation::highlight(0, ScreenRect::new(1.0, 1.0, 5.0, 5.0), Color::YELLOW)],
        )
        .unwrap();
        assert_eq!(doc.objects.len(), before);
        assert!(!doc.get_dictionary(page_ids(&doc)[0]).unwrap().has(b"Resources"));
    }

    #[test]
    fn test_untouched_pages_pass_through() {
        let doc = load(&create_test_pdf(3, "A"));
        let annotated = apply_annotations(
            &doc,
            &[Annotation::highlight(1, ScreenRect::new(1.0, 1.0, 5.0, 5.0), Color::YELLOW)],
        )
        .unwrap();
        let ids = page_ids(&annotated);
        for page in [0, 2] {
            assert_eq!(
                format!("{:?}", annotated.get_dictionary(ids[page]).unwrap()),
                format!("{:?}", doc.get_dictionary(ids[page]).unwrap())
            );
        }
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_original_content_precedes_marks() {
        let doc = load(&create_test_pdf(1, "Orig"));
        let annotated = apply_annotations(
            &doc,
            &[Annotation::highlight(0, ScreenRect::new(1.0, 1.0, 5.0, 5.0), Color::YELLOW)],
        )
        .unwrap();
        let ops: Vec<String> = page_ops(&annotated, 0)
            .into_iter()
            .map(|op| op.operator)
            .collect();
        let bt = ops.iter().position(|o| o == "BT").unwrap();
        let re = ops.iter().position(|o| o == "re").unwrap();
        assert_eq!(ops.first().map(String::as_str), Some("q"));
        assert!(bt < re);
    }

    #[test]
    fn test_layering_follows_annotation_order() {
        let doc = load(&create_test_pdf(1, "A"));
        let annotated = apply_annotations(
            &doc,
            &[
                Annotation::highlight(0, ScreenRect::new(1.0, 1.0, 5.0, 5.0), Color::YELLOW),
                Annotation::Stroke {
                    page: 0,
                    points: vec![Point::new(0.0, 0.0), Point::new(4.0, 4.0)],
                    color: Color::RED,
                    width: 1.0,
                },
            ],
        )
        .unwrap();
        let ops: Vec<String> = page_ops(&annotated, 0)
            .into_iter()
            .map(|op| op.operator)
            .collect();
        let fill = ops.iter().position(|o| o == "f").unwrap();
        let stroke = ops.iter().position(|o| o == "S").unwrap();
        assert!(fill < stroke);
    }

    #[test]
    fn test_indirect_contents_array_is_flattened() {
        let mut doc = load(&create_test_pdf(1, "Orig"));
        let page_id = page_ids(&doc)[0];
        let stream_id = doc
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_reference()
            .unwrap();
        let array_id = doc.add_object(Object::Array(vec![Object::Reference(stream_id)]));
        doc.get_dictionary_mut(page_id)
            .unwrap()
            .set("Contents", Object::Reference(array_id));

        let annotated = apply_annotations(
            &doc,
            &[Annotation::highlight(0, ScreenRect::new(1.0, 1.0, 5.0, 5.0), Color::YELLOW)],
        )
        .unwrap();

        let contents = annotated
            .get_dictionary(page_id)
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(contents.len(), 3);
        assert!(contents.iter().all(|obj| obj.as_reference().is_ok()));
        assert_eq!(contents[1], Object::Reference(stream_id));

        let ops: Vec<String> = page_ops(&annotated, 0)
            .into_iter()
            .map(|op| op.operator)
            .collect();
        let tj = ops.iter().position(|o| o == "Tj").unwrap();
        let re = ops.iter().position(|o| o == "re").unwrap();
        assert!(tj < re);
    }

    #[test]
    fn test_win_ansi_passes_latin1_and_replaces_the_rest() {
        assert_eq!(win_ansi("Verse é"), b"Verse \xE9".to_vec());
        assert_eq!(win_ansi("\u{20AC}\u{85}\u{9}"), b"???".to_vec());
        assert_eq!(win_ansi("\u{A0}\u{FF}~"), vec![0xA0, 0xFF, b'~']);
    }
}
