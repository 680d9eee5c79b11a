//! PDF content-stream scanning: does the document show text, and at what
//! resolution is its first raster image placed.

use crate::error::{MediaExtractionError, Result};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::Path;
use tracing::debug;

/// Points per inch of the PDF coordinate space.
pub const DISPLAY_DPI: f64 = 72.0;

const MAX_NESTING: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PdfCharacteristics {
    pub contains_text: bool,
    /// Resolution of the first image encountered, in DPI.
    pub resolution: Option<u32>,
}

impl PdfCharacteristics {
    fn complete(&self) -> bool {
        self.contains_text && self.resolution.is_some()
    }
}

/// Affine transformation `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let mut values = [0.0; 6];
        for (value, operand) in values.iter_mut().zip(operands) {
            *value = number(operand)?;
        }
        Some(Matrix(values))
    }

    /// `self × other`, i.e. `self` applied first.
    fn multiply(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(value) => Some(*value as f64),
        Object::Real(value) => Some(f64::from(*value)),
        _ => None,
    }
}

fn is_non_empty_string(object: &Object) -> bool {
    matches!(object, Object::String(bytes, _) if !bytes.is_empty())
}

/// DPI of an image of `width`×`height` pixels drawn with transformation `ctm`.
fn image_dpi(width: f64, height: f64, ctm: &Matrix) -> Option<u32> {
    let width_in_inches = ctm.0[0] / DISPLAY_DPI;
    let height_in_inches = ctm.0[3] / DISPLAY_DPI;
    let x_dpi = (width / width_in_inches).round().abs();
    let y_dpi = (height / height_in_inches).round().abs();
    let dpi = x_dpi.min(y_dpi);
    (dpi.is_finite() && dpi <= f64::from(u32::MAX)).then_some(dpi as u32)
}

struct Scanner<'a> {
    document: &'a Document,
    characteristics: PdfCharacteristics,
}

impl<'a> Scanner<'a> {
    fn resolve(&self, object: &'a Object) -> Option<&'a Object> {
        self.document.dereference(object).ok().map(|(_, resolved)| resolved)
    }

    fn resolve_dictionary(&self, object: &'a Object) -> Option<&'a Dictionary> {
        match self.resolve(object)? {
            Object::Dictionary(dictionary) => Some(dictionary),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    fn resolve_number(&self, dictionary: &'a Dictionary, key: &[u8]) -> Option<f64> {
        number(self.resolve(dictionary.get(key).ok()?)?)
    }

    /// Page resources, inherited from the page tree when the page has none.
    fn page_resources(&self, page_id: ObjectId) -> Option<&'a Dictionary> {
        let mut node = self.document.get_dictionary(page_id).ok()?;
        for _ in 0..MAX_NESTING * 4 {
            if let Ok(resources) = node.get(b"Resources") {
                return self.resolve_dictionary(resources);
            }
            let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
            node = self.document.get_dictionary(parent).ok()?;
        }
        None
    }

    fn scan_page(&mut self, page_id: ObjectId) {
        let data = match self.document.get_page_content(page_id) {
            Ok(data) => data,
            Err(e) => {
                debug!("Could not read content of page {:?}: {}", page_id, e);
                return;
            }
        };
        let resources = self.page_resources(page_id);
        self.scan_content(&data, resources, Matrix::IDENTITY, 0);
    }

    fn scan_content(&mut self, data: &[u8], resources: Option<&'a Dictionary>, base: Matrix, depth: usize) {
        let content = match Content::decode(data) {
            Ok(content) => content,
            Err(e) => {
                debug!("Could not decode PDF content stream: {}", e);
                return;
            }
        };

        let mut ctm = base;
        let mut saved = Vec::new();
        for operation in &content.operations {
            match operation.operator.as_str() {
                "q" => saved.push(ctm),
                "Q" => ctm = saved.pop().unwrap_or(base),
                "cm" => {
                    if let Some(matrix) = Matrix::from_operands(&operation.operands) {
                        ctm = matrix.multiply(&ctm);
                    }
                }
                "Tj" | "'" | "\"" => {
                    if operation.operands.last().is_some_and(is_non_empty_string) {
                        self.characteristics.contains_text = true;
                    }
                }
                "TJ" => {
                    let shows_text = match operation.operands.first() {
                        Some(Object::Array(parts)) => parts.iter().any(is_non_empty_string),
                        _ => false,
                    };
                    if shows_text {
                        self.characteristics.contains_text = true;
                    }
                }
                "Do" => {
                    if let Some(Object::Name(name)) = operation.operands.first() {
                        self.draw_xobject(name, resources, ctm, depth);
                    }
                }
                _ => {}
            }
            if self.characteristics.complete() {
                return;
            }
        }
    }

    fn draw_xobject(&mut self, name: &[u8], resources: Option<&'a Dictionary>, ctm: Matrix, depth: usize) {
        let Some(stream) = resources
            .and_then(|resources| resources.get(b"XObject").ok())
            .and_then(|xobjects| self.resolve_dictionary(xobjects))
            .and_then(|xobjects| xobjects.get(name).ok())
            .and_then(|xobject| self.resolve(xobject))
            .and_then(|xobject| xobject.as_stream().ok())
        else {
            return;
        };

        match stream.dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => {
                if self.characteristics.resolution.is_some() {
                    return;
                }
                let width = self.resolve_number(&stream.dict, b"Width");
                let height = self.resolve_number(&stream.dict, b"Height");
                if let (Some(width), Some(height)) = (width, height) {
                    self.characteristics.resolution = image_dpi(width, height, &ctm);
                }
            }
            Ok(b"Form") if depth < MAX_NESTING => {
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|matrix| match self.resolve(matrix)? {
                        Object::Array(values) => Matrix::from_operands(values),
                        _ => None,
                    })
                    .unwrap_or(Matrix::IDENTITY);
                let form_resources = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|r| self.resolve_dictionary(r))
                    .or(resources);
                let data = stream.decompressed_content().unwrap_or_else(|_| stream.content.clone());
                self.scan_content(&data, form_resources, form_matrix.multiply(&ctm), depth + 1);
            }
            _ => {}
        }
    }
}

/// Scan the pages in order until both text and an image resolution are found.
pub fn find_pdf_characteristics(path: &Path) -> Result<PdfCharacteristics> {
    let document = Document::load(path)
        .map_err(|e| MediaExtractionError::ProcessingError(format!("Problem while reading PDF file: {}", e)))?;

    let mut scanner = Scanner {
        document: &document,
        characteristics: PdfCharacteristics::default(),
    };
    for page_id in document.get_pages().into_values() {
        scanner.scan_page(page_id);
        if scanner.characteristics.complete() {
            break;
        }
    }
    Ok(scanner.characteristics)
}
