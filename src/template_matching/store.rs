//! Loading and organising labelled templates

use super::kernel::{LumaPlane, PreparedTemplate};
use super::region::SearchRegion;
use super::types::Template;
use crate::error::{VisionError, VisionResult};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Read-only collection of templates grouped by label.
///
/// Loaded once at startup; matcher calls borrow templates from it.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    by_label: BTreeMap<String, Vec<Template>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already constructed templates.
    pub fn from_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let mut store = Self::new();
        for template in templates {
            store.insert(template);
        }
        store
    }

    pub fn insert(&mut self, template: Template) {
        self.by_label
            .entry(template.label.clone())
            .or_default()
            .push(template);
    }

    /// Load every `*.png` in `directory`.
    ///
    /// File names follow `<label>[@<variant>][-[x,y,w,h]].png`. When the
    /// bracketed region is present the template is cropped out of the image,
    /// which lets full screenshots double as template files. `thresholds`
    /// maps labels to per-label threshold overrides.
    pub fn load_from_directory(
        directory: impl AsRef<Path>,
        thresholds: &HashMap<String, f32>,
    ) -> VisionResult<Self> {
        let dir_path = directory.as_ref();
        if !dir_path.is_dir() {
            return Err(VisionError::TemplateDirNotFound(dir_path.to_path_buf()));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir_path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("png"))
            })
            .collect();
        // Sorted for consistent variant order
        paths.sort();

        let mut store = Self::new();
        for path in paths {
            let mut template = load_template_file(&path)?;
            if let Some(&threshold) = thresholds.get(&template.label) {
                template = template.with_threshold(threshold);
            }
            log::debug!("📐 Loaded template {} from {:?}", template.display_name(), path);
            store.insert(template);
        }

        for label in thresholds.keys() {
            if !store.by_label.contains_key(label) {
                log::warn!("⚠️ Threshold override for unknown template label '{}'", label);
            }
        }
        log::info!(
            "✅ Loaded {} template(s) for {} label(s) from {:?}",
            store.len(),
            store.by_label.len(),
            dir_path
        );
        Ok(store)
    }

    /// All variants registered under `label` (empty when unknown).
    pub fn variants(&self, label: &str) -> &[Template] {
        self.by_label.get(label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.by_label.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.by_label.values().flatten()
    }

    /// Total number of templates, counting every variant.
    pub fn len(&self) -> usize {
        self.by_label.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }
}

/// Split a file stem into `(label, variant)`.
///
/// `rally_button@pressed-[10,20,30,40]` gives `("rally_button", Some("pressed"))`.
pub fn parse_template_name(stem: &str) -> Option<(String, Option<String>)> {
    let without_region = match stem.find('[') {
        Some(idx) => &stem[..idx],
        None => stem,
    };
    let trimmed = without_region.trim_end_matches(['-', '_', ' ']);
    let (label, variant) = match trimmed.split_once('@') {
        Some((label, variant)) => (label, Some(variant.trim())),
        None => (trimmed, None),
    };
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    let variant = variant.filter(|v| !v.is_empty()).map(str::to_string);
    Some((label.to_string(), variant))
}

fn load_template_file(path: &Path) -> VisionResult<Template> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| VisionError::Config(format!("template file name is not UTF-8: {path:?}")))?;
    let (label, variant) = parse_template_name(stem)
        .ok_or_else(|| VisionError::Config(format!("template file has no label: {path:?}")))?;

    let full = image::open(path)?.to_rgb8();
    let image = match SearchRegion::parse_from_filename(stem) {
        Some(crop) => {
            if !crop.is_valid() || !crop.fits_within(full.width(), full.height()) {
                return Err(VisionError::CropOutOfBounds {
                    path: path.to_path_buf(),
                    x: crop.x,
                    y: crop.y,
                    width: crop.width,
                    height: crop.height,
                    image_width: full.width(),
                    image_height: full.height(),
                });
            }
            image::imageops::crop_imm(&full, crop.x, crop.y, crop.width, crop.height).to_image()
        }
        None => full,
    };

    let mut template = Template::new(label, image)?.with_source(path.to_path_buf());
    if let Some(variant) = variant {
        template = template.with_variant(variant);
    }
    if PreparedTemplate::new(&LumaPlane::from_rgb(&template.image)).is_none() {
        return Err(VisionError::FlatTemplate {
            label: template.label,
        });
    }
    Ok(template)
}
