//! Page layout calculations for image pages

use crate::error::{Error, Result};

/// Length in PDF points (1/72 inch)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Length(pub f64);

impl Length {
    /// Create a length from points
    pub fn from_pt(pt: f64) -> Self {
        Length(pt)
    }

    /// Create a length from millimeters
    pub fn from_mm(mm: f64) -> Self {
        Length(mm * 72.0 / 25.4)
    }

    /// Create a length from inches
    pub fn from_inches(inches: f64) -> Self {
        Length(inches * 72.0)
    }

    /// Get the value in points
    pub fn pt(&self) -> f64 {
        self.0
    }

    /// Get the value in millimeters
    pub fn mm(&self) -> f64 {
        self.0 * 25.4 / 72.0
    }
}

/// Size and margin of pages created for images
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: Length,
    pub height: Length,
    /// Applied on every side
    pub margin: Length,
}

impl PageGeometry {
    /// Margin used when none is given
    pub const DEFAULT_MARGIN_PT: f64 = 20.0;

    /// US Letter (612 x 792 pt)
    pub fn letter() -> Self {
        Self {
            width: Length::from_inches(8.5),
            height: Length::from_inches(11.0),
            margin: Length::from_pt(Self::DEFAULT_MARGIN_PT),
        }
    }

    /// A4 (210 x 297 mm)
    pub fn a4() -> Self {
        Self {
            width: Length::from_mm(210.0),
            height: Length::from_mm(297.0),
            margin: Length::from_pt(Self::DEFAULT_MARGIN_PT),
        }
    }

    pub fn with_margin(mut self, margin: Length) -> Self {
        self.margin = margin;
        self
    }

    /// Check that images placed on this page would be visible
    ///
    /// Width and height must be positive, the margin non-negative, and some
    /// area must be left inside the margins.
    pub fn validate(&self) -> Result<()> {
        let (width, height, margin) = (self.width.pt(), self.height.pt(), self.margin.pt());

        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "page size must be positive, got {}x{} pt",
                width, height
            )));
        }
        if !(margin.is_finite() && margin >= 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "margin must be non-negative, got {} pt",
                margin
            )));
        }

        let (avail_w, avail_h) = self.available();
        if avail_w <= 0.0 || avail_h <= 0.0 {
            return Err(Error::InvalidGeometry(format!(
                "a {} pt margin leaves no room on a {}x{} pt page",
                margin, width, height
            )));
        }

        Ok(())
    }

    /// Width and height left for the image once margins are taken off
    ///
    /// Never negative; a margin wider than half the page leaves no room.
    pub fn available(&self) -> (f64, f64) {
        let inset = 2.0 * self.margin.pt();
        (
            (self.width.pt() - inset).max(0.0),
            (self.height.pt() - inset).max(0.0),
        )
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::letter()
    }
}

/// Where an image lands on its page, in points with origin at bottom-left
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Factor applied to the native pixel size
    pub scale: f64,
}

impl Placement {
    pub fn left_margin(&self) -> f64 {
        self.x
    }

    pub fn right_margin(&self, page: &PageGeometry) -> f64 {
        page.width.pt() - self.x - self.width
    }

    pub fn bottom_margin(&self) -> f64 {
        self.y
    }

    pub fn top_margin(&self, page: &PageGeometry) -> f64 {
        page.height.pt() - self.y - self.height
    }
}

/// Largest uniform scale keeping `image_width x image_height` inside the bounds
///
/// With `allow_upscale` false the factor is capped at 1.0, so small images
/// keep their native size instead of being blown up.
pub fn scale_to_fit(
    image_width: f64,
    image_height: f64,
    bound_width: f64,
    bound_height: f64,
    allow_upscale: bool,
) -> f64 {
    if image_width <= 0.0 || image_height <= 0.0 {
        return 0.0;
    }

    let scale = (bound_width / image_width).min(bound_height / image_height);
    if allow_upscale {
        scale
    } else {
        scale.min(1.0)
    }
}

/// Scale an image into the page's available area and center it
pub fn place_image(
    page: &PageGeometry,
    image_width: u32,
    image_height: u32,
    allow_upscale: bool,
) -> Placement {
    let (avail_w, avail_h) = page.available();
    let (w, h) = (f64::from(image_width), f64::from(image_height));
    let scale = scale_to_fit(w, h, avail_w, avail_h, allow_upscale);

    let width = w * scale;
    let height = h * scale;

    Placement {
        x: (page.width.pt() - width) / 2.0,
        y: (page.height.pt() - height) / 2.0,
        width,
        height,
        scale,
    }
}
