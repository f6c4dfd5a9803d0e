// non-positive dimensions in a requested size mean "no preference"
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub const fn is_unconstrained(&self) -> bool {
        self.width <= 0 && self.height <= 0
    }

    pub fn or_default(self, default: Self) -> (u32, u32) {
        fn pick(value: i32, default: i32) -> u32 {
            let value = if value > 0 { value } else { default };
            value.max(1) as u32
        }

        (
            pick(self.width, default.width),
            pick(self.height, default.height),
        )
    }

    // both positive: largest size inside the box. one positive: that one is matched
    pub fn fit(self, (src_w, src_h): (u32, u32)) -> (u32, u32) {
        if src_w == 0 || src_h == 0 {
            return (src_w, src_h);
        }

        let (sw, sh) = (f64::from(src_w), f64::from(src_h));
        let scale = match (self.width > 0, self.height > 0) {
            (true, true) => {
                (f64::from(self.width) / sw).min(f64::from(self.height) / sh)
            }
            (true, false) => f64::from(self.width) / sw,
            (false, true) => f64::from(self.height) / sh,
            (false, false) => return (src_w, src_h),
        };

        let scaled = |v: f64| (v * scale).round().max(1.0) as u32;
        (scaled(sw), scaled(sh))
    }

    pub fn limit(self, dims: (u32, u32)) -> (u32, u32) {
        let max = Self::new(self.width.max(1), self.height.max(1));
        if dims.0 <= max.width as u32 && dims.1 <= max.height as u32 {
            return dims;
        }
        max.fit(dims)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self {
            width: width.min(i32::MAX as u32) as i32,
            height: height.min(i32::MAX as u32) as i32,
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{w}x{h}", w = self.width, h = self.height)
    }
}
