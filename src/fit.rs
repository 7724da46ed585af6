//! Adaptive label sizing.
//!
//! Finds the largest integer font size at which a label still fits a fixed
//! width on the page. Measuring is delegated to a [`MeasureText`]
//! implementation, which must be monotonically non-decreasing in size.

/// Something that knows how wide a string renders at a given font size.
pub trait MeasureText {
    /// Rendered width of `text` at `size`, in points.
    fn width_of_text_at_size(&self, text: &str, size: u32) -> f64;
}

impl<F> MeasureText for F
where
    F: Fn(&str, u32) -> f64,
{
    fn width_of_text_at_size(&self, text: &str, size: u32) -> f64 {
        self(text, size)
    }
}

/// Return the largest size in `min_size..=default_size` at which `text` is
/// no wider than `max_width`, or `None` if it overflows even at `min_size`.
///
/// Scans downward one point at a time starting at `default_size`.
pub fn ideal_font_size<M>(
    font: &M,
    text: &str,
    max_width: f64,
    min_size: u32,
    default_size: u32,
) -> Option<u32>
where
    M: MeasureText + ?Sized,
{
    let mut current_size = default_size;
    let mut text_width = font.width_of_text_at_size(text, current_size);

    while text_width > max_width && current_size > min_size {
        current_size -= 1;
        text_width = font.width_of_text_at_size(text, current_size);
    }

    if text_width > max_width {
        None
    } else {
        Some(current_size)
    }
}
