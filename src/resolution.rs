//! Image resolutions and aspect ratios.

use std::fmt;

/// Resolution (`width x height`) of an image, window, or camera frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Computes the [`AspectRatio`] of this [`Resolution`].
    ///
    /// Returns `None` if the width or height is 0.
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::new(self.width, self.height)
    }

    /// Computes the centered, maximally sized sub-area of `self` that has the given aspect
    /// ratio, as `(x, y, width, height)`.
    ///
    /// This is the area an image of aspect ratio `ratio` covers when letter-/pillarboxed into
    /// `self`.
    pub fn fit_aspect_ratio(&self, ratio: AspectRatio) -> (u32, u32, u32, u32) {
        let own_ratio = match self.aspect_ratio() {
            Some(r) => r.as_f32(),
            None => return (0, 0, self.width, self.height),
        };
        let ratio = ratio.as_f32();

        if ratio > own_ratio {
            // Wider content: full width, letterboxed.
            let h = (self.width as f32 / ratio) as u32;
            (0, (self.height - h) / 2, self.width, h)
        } else {
            // Taller (or equal) content: full height, pillarboxed.
            let w = (self.height as f32 * ratio) as u32;
            ((self.width - w) / 2, 0, w, self.height)
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Ratio of a width to a height.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct AspectRatio {
    // Invariant: both fields nonzero, with their GCD divided out.
    width: u32,
    height: u32,
}

impl AspectRatio {
    /// 1:1 aspect ratio, as used by most CNN inputs.
    pub const SQUARE: Self = Self {
        width: 1,
        height: 1,
    };

    /// Creates the aspect ratio representing `width:height`.
    ///
    /// Returns `None` if either value is 0.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }

        let gcd = gcd(width, height);
        Some(Self {
            width: width / gcd,
            height: height / gcd,
        })
    }

    /// Returns the `f32` corresponding to this ratio.
    #[inline]
    pub fn as_f32(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

impl fmt::Debug for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

const fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b > 0 {
        let t = b;
        b = a % b;
        a = t;
    }

    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratios_are_reduced() {
        let ratio1 = AspectRatio::new(1920, 1080).unwrap();
        let ratio2 = AspectRatio::new(1280, 720).unwrap();
        assert_eq!(ratio1, ratio2);
        assert_eq!(ratio1.to_string(), "16:9");
    }

    #[test]
    fn fit_aspect_ratio_letterboxes_and_pillarboxes() {
        assert_eq!(
            Resolution::new(16, 16).fit_aspect_ratio(AspectRatio::new(16, 8).unwrap()),
            (0, 4, 16, 8)
        );
        assert_eq!(
            Resolution::new(16, 16).fit_aspect_ratio(AspectRatio::new(8, 16).unwrap()),
            (4, 0, 8, 16)
        );
        assert_eq!(
            Resolution::new(16, 8).fit_aspect_ratio(AspectRatio::new(16, 8).unwrap()),
            (0, 0, 16, 8)
        );
    }
}
