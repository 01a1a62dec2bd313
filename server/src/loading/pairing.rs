//! Collecting upload parts and pairing declarations with images by code

use bytes::Bytes;
use dispatch_shared::protocol::{MedicineDeclaration, UploadPart};
use dispatch_shared::{parts, DispatchError};
use std::collections::{BTreeSet, HashMap};

/// Size limits for a single loading upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    /// Largest accepted image
    pub max_image_bytes: usize,
    /// Largest accepted sum over all parts
    pub max_total_bytes: usize,
    /// Most cargo items per load
    pub max_items: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 5 * 1024 * 1024,
            max_total_bytes: 20 * 1024 * 1024,
            max_items: 50,
        }
    }
}

/// Bytes of JSON around the parts of a load request
const ENVELOPE_ALLOWANCE: usize = 4 * 1024;
/// Bytes of JSON around one part, filename included
const PART_ALLOWANCE: usize = 1024;

impl UploadLimits {
    /// Size of the largest request frame an upload within these limits
    /// can produce, with part data base64-encoded on the wire
    pub fn max_frame_bytes(&self) -> usize {
        let encoded = self.max_total_bytes.div_ceil(3).saturating_mul(4);
        let parts = self.max_items.saturating_mul(2 * PART_ALLOWANCE);
        encoded
            .saturating_add(ENVELOPE_ALLOWANCE)
            .saturating_add(parts)
    }
}

/// An image part with its correlation code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub code: String,
    pub filename: String,
    pub data: Bytes,
}

impl ImageUpload {
    /// The code of an image is its filename without the extension
    pub fn new(filename: impl Into<String>, data: Bytes) -> Self {
        let filename = filename.into();
        let code = match filename.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => filename.clone(),
        };
        Self {
            code,
            filename,
            data,
        }
    }
}

/// All declarations and images of one loading request, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBatch {
    pub declarations: Vec<MedicineDeclaration>,
    pub images: Vec<ImageUpload>,
}

/// Bounded accumulator for the parts of one upload
#[derive(Debug)]
pub struct UploadBuffer {
    limits: UploadLimits,
    total_bytes: usize,
    batch: LoadBatch,
}

impl UploadBuffer {
    pub fn new(limits: UploadLimits) -> Self {
        Self {
            limits,
            total_bytes: 0,
            batch: LoadBatch::default(),
        }
    }

    /// Accept one part, enforcing part names and size limits
    pub fn push(&mut self, part: UploadPart) -> Result<(), DispatchError> {
        self.total_bytes += part.data.len();
        if self.total_bytes > self.limits.max_total_bytes {
            return Err(DispatchError::PayloadTooLarge(format!(
                "upload exceeds {} bytes",
                self.limits.max_total_bytes
            )));
        }

        match part.name.as_str() {
            parts::MEDICINES => {
                if self.batch.declarations.len() >= self.limits.max_items {
                    return Err(DispatchError::PayloadTooLarge(format!(
                        "more than {} medicines",
                        self.limits.max_items
                    )));
                }
                let declaration: MedicineDeclaration = serde_json::from_slice(&part.data)
                    .map_err(|e| {
                        DispatchError::MalformedRequest(format!(
                            "medicine part {:?} is not a valid declaration: {}",
                            part.filename, e
                        ))
                    })?;
                self.batch.declarations.push(declaration);
            }
            parts::IMAGES => {
                if part.data.is_empty() {
                    return Err(DispatchError::MalformedRequest(format!(
                        "image part {:?} is empty",
                        part.filename
                    )));
                }
                if part.data.len() > self.limits.max_image_bytes {
                    return Err(DispatchError::PayloadTooLarge(format!(
                        "image {:?} is {} bytes (max {})",
                        part.filename,
                        part.data.len(),
                        self.limits.max_image_bytes
                    )));
                }
                if self.batch.images.len() >= self.limits.max_items {
                    return Err(DispatchError::PayloadTooLarge(format!(
                        "more than {} images",
                        self.limits.max_items
                    )));
                }
                self.batch.images.push(ImageUpload::new(part.filename, part.data));
            }
            other => {
                return Err(DispatchError::MalformedRequest(format!(
                    "unsupported part name {:?} (expected {:?} or {:?})",
                    other,
                    parts::MEDICINES,
                    parts::IMAGES
                )));
            }
        }

        Ok(())
    }

    pub fn finish(self) -> LoadBatch {
        self.batch
    }
}

/// Collect every part of an upload into a batch
pub fn collect_parts(
    upload: impl IntoIterator<Item = UploadPart>,
    limits: UploadLimits,
) -> Result<LoadBatch, DispatchError> {
    let mut buffer = UploadBuffer::new(limits);
    for part in upload {
        buffer.push(part)?;
    }
    Ok(buffer.finish())
}

/// Pair each declaration with the image of the same code.
///
/// Pairs come back in declaration order. Every code must appear exactly once
/// on each side, otherwise the whole batch is rejected.
pub fn pair(batch: LoadBatch) -> Result<Vec<(MedicineDeclaration, ImageUpload)>, DispatchError> {
    if batch.declarations.is_empty() && batch.images.is_empty() {
        return Err(DispatchError::MalformedRequest("no cargo items".into()));
    }

    let mut images: HashMap<String, ImageUpload> = HashMap::with_capacity(batch.images.len());
    for image in batch.images {
        if let Some(previous) = images.insert(image.code.clone(), image) {
            return Err(DispatchError::UnmatchedParts(format!(
                "more than one image for code {}",
                previous.code
            )));
        }
    }

    let mut declared = BTreeSet::new();
    for declaration in &batch.declarations {
        if !declared.insert(declaration.code.as_str()) {
            return Err(DispatchError::UnmatchedParts(format!(
                "more than one medicine with code {}",
                declaration.code
            )));
        }
    }

    let without_image: Vec<&str> = declared
        .iter()
        .copied()
        .filter(|code| !images.contains_key(*code))
        .collect();
    let mut without_declaration: Vec<&str> = images
        .keys()
        .map(String::as_str)
        .filter(|code| !declared.contains(code))
        .collect();
    without_declaration.sort_unstable();

    if !without_image.is_empty() || !without_declaration.is_empty() {
        return Err(DispatchError::UnmatchedParts(format!(
            "medicines without image: [{}]; images without medicine: [{}]",
            without_image.join(", "),
            without_declaration.join(", ")
        )));
    }

    let pairs = batch
        .declarations
        .into_iter()
        .filter_map(|declaration| {
            images
                .remove(&declaration.code)
                .map(|image| (declaration, image))
        })
        .collect();

    Ok(pairs)
}
