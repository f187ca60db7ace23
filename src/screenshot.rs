//! Screenshots of a document region for the registration record.
//!
//! Rasterization itself is delegated to a `Rasterizer`; this module prepares the
//! element tree around it, encodes the pixels as a JPEG data URI and turns that
//! URI back into binary for multipart uploads.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::time::Duration;

use crate::errors::AppError;
use crate::http_client::FormPayload;

const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Default multipart field for the screenshot binary.
pub const SCREENSHOT_FIELD: &str = "screenshot_file";

/// Inline styles applied to tables while they are captured.
const TABLE_CAPTURE_STYLE: &[(&str, &str)] = &[
    ("display", "table"),
    ("table-layout", "fixed"),
    ("width", "100%"),
    ("max-width", "100%"),
    ("border-collapse", "collapse"),
];

/// A node of the region being captured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub class: String,
    /// Inline style attribute; `None` when the attribute is absent.
    pub style: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = class.into();
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_table_like(&self) -> bool {
        self.tag.eq_ignore_ascii_case("table") || self.class.contains("table")
    }

    /// Sets one inline style property, keeping the others in place.
    pub fn set_style_property(&mut self, property: &str, value: &str) {
        let mut declarations: Vec<(String, String)> = self
            .style
            .as_deref()
            .unwrap_or("")
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .map(|(p, v)| (p.trim().to_string(), v.trim().to_string()))
            .filter(|(p, _)| !p.is_empty())
            .collect();

        match declarations.iter_mut().find(|(p, _)| p == property) {
            Some(existing) => existing.1 = value.to_string(),
            None => declarations.push((property.to_string(), value.to_string())),
        }

        self.style = Some(
            declarations
                .iter()
                .map(|(p, v)| format!("{}: {};", p, v))
                .collect::<Vec<_>>()
                .join(" "),
        );
    }

    /// Visits every table-like descendant (not `self`) in document order.
    fn for_each_table_mut(&mut self, f: &mut impl FnMut(&mut Element)) {
        for child in &mut self.children {
            if child.is_table_like() {
                f(child);
            }
            child.for_each_table_mut(f);
        }
    }
}

/// Options handed to the rasterizer.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    pub scale: f32,
    pub background: String,
    pub image_timeout: Duration,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: 2.0,
            background: "#ffffff".to_string(),
            image_timeout: Duration::from_secs(15),
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Pause between style normalization and rasterization.
    pub settle_delay: Duration,
    pub jpeg_quality: u8,
    pub raster: RasterOptions,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            jpeg_quality: 85,
            raster: RasterOptions::default(),
        }
    }
}

/// Turns an element subtree into pixels.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(
        &self,
        element: &Element,
        options: &RasterOptions,
    ) -> Result<DynamicImage, AppError>;
}

/// Applies capture styles to tables and puts the original inline styles back
/// when dropped, whatever way the capture ends.
struct TableStyleGuard<'a> {
    root: &'a mut Element,
    originals: Vec<Option<String>>,
}

impl<'a> TableStyleGuard<'a> {
    fn apply(root: &'a mut Element) -> Self {
        let mut originals = Vec::new();
        root.for_each_table_mut(&mut |table| {
            originals.push(table.style.clone());
            for (property, value) in TABLE_CAPTURE_STYLE {
                table.set_style_property(property, value);
            }
        });
        if !originals.is_empty() {
            tracing::debug!("Optimizing {} tables for screenshot capture", originals.len());
        }
        Self { root, originals }
    }

    fn element(&self) -> &Element {
        &*self.root
    }
}

impl Drop for TableStyleGuard<'_> {
    fn drop(&mut self) {
        let mut originals = std::mem::take(&mut self.originals).into_iter();
        self.root.for_each_table_mut(&mut |table| {
            table.style = originals.next().flatten();
        });
    }
}

/// Encodes pixels as a `data:image/jpeg;base64,` URI.
pub fn encode_jpeg_data_url(image: &DynamicImage, quality: u8) -> Result<String, AppError> {
    let mut buf = Vec::new();
    image
        .to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(&buf)))
}

/// Binary form of a data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Decodes a `data:<type>;base64,<payload>` URI.
pub fn data_url_to_blob(data_url: &str) -> Result<Blob, AppError> {
    let (header, payload) = data_url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
        .ok_or_else(|| AppError::InvalidInput("malformed data URI".to_string()))?;

    let bytes = STANDARD.decode(payload.trim())?;
    Ok(Blob {
        content_type: header.to_string(),
        bytes,
    })
}

/// Appends the screenshot binary under `field_name` and the data URI under
/// `screenshot`.
pub fn append_screenshot(
    form: &mut FormPayload,
    field_name: &str,
    data_url: &str,
) -> Result<(), AppError> {
    let blob = data_url_to_blob(data_url)?;
    form.file(field_name, "screenshot.jpg", blob.content_type, blob.bytes)
        .text("screenshot", data_url);
    Ok(())
}

/// Holds the most recent capture along with busy and error state.
pub struct ScreenshotCapture<R> {
    rasterizer: R,
    current: Option<String>,
    capturing: bool,
    error: Option<String>,
}

impl<R: Rasterizer> ScreenshotCapture<R> {
    pub fn new(rasterizer: R) -> Self {
        Self {
            rasterizer,
            current: None,
            capturing: false,
            error: None,
        }
    }

    /// The last successful capture, as a data URI.
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn set_current(&mut self, data_url: Option<String>) {
        self.current = data_url;
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Captures `target`. On failure the previous capture is kept.
    pub async fn capture_element(
        &mut self,
        target: Option<&mut Element>,
        options: &CaptureOptions,
    ) -> Option<String> {
        let Some(target) = target else {
            tracing::warn!("No element provided for screenshot");
            self.error = Some("No element provided for screenshot".to_string());
            return None;
        };

        self.capturing = true;
        self.error = None;

        let result = {
            let guard = TableStyleGuard::apply(target);
            tokio::time::sleep(options.settle_delay).await;
            self.rasterizer
                .rasterize(guard.element(), &options.raster)
                .await
        };

        self.capturing = false;

        match result.and_then(|image| encode_jpeg_data_url(&image, options.jpeg_quality)) {
            Ok(data_url) => {
                tracing::info!("Screenshot captured, size: {} bytes", data_url.len());
                self.current = Some(data_url.clone());
                Some(data_url)
            }
            Err(e) => {
                tracing::error!("Screenshot capture failed: {}", e);
                self.error = Some(format!("Screenshot capture failed: {}", e));
                None
            }
        }
    }

    /// Decodes `data_url`, or the current capture when `None`.
    pub fn to_blob(&mut self, data_url: Option<&str>) -> Option<Blob> {
        let Some(data_url) = data_url.or(self.current.as_deref()) else {
            self.error = Some("No screenshot available to convert".to_string());
            return None;
        };

        match data_url_to_blob(data_url) {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::error!("Error converting screenshot to blob: {}", e);
                self.error = Some(format!("Error converting screenshot: {}", e));
                None
            }
        }
    }

    /// Adds the screenshot (explicit, or the current capture) to `form`.
    pub fn append_to_form_data(
        &mut self,
        form: &mut FormPayload,
        field_name: Option<&str>,
        data_url: Option<&str>,
    ) -> bool {
        let Some(data_url) = data_url.map(str::to_string).or_else(|| self.current.clone()) else {
            self.error = Some("No screenshot available".to_string());
            return false;
        };

        match append_screenshot(form, field_name.unwrap_or(SCREENSHOT_FIELD), &data_url) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Error appending screenshot to form: {}", e);
                self.error = Some(format!("Error preparing screenshot: {}", e));
                false
            }
        }
    }
}
