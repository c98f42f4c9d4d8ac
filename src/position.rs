use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance, used for circular hit boxes.
    pub fn distance(&self, other: &Position) -> f64 {
        let dx = self.x as f64 - other.x as f64;
        let dy = self.y as f64 - other.y as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Play-area limits for target placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub max_x: u32,
    pub max_y: u32,
    pub min_margin: u32,
    pub top_margin: u32,
}

impl Bounds {
    pub fn new(max_x: u32, max_y: u32, min_margin: u32, top_margin: u32) -> Self {
        Self {
            max_x,
            max_y,
            min_margin,
            top_margin,
        }
    }

    /// Inclusive x range; collapses to `min_margin` if the area is too narrow.
    pub fn x_range(&self) -> (u32, u32) {
        let lo = self.min_margin;
        let hi = self.max_x.saturating_sub(self.min_margin).max(lo);
        (lo, hi)
    }

    /// Inclusive y range; collapses to `top_margin` if the area is too short.
    pub fn y_range(&self) -> (u32, u32) {
        let lo = self.top_margin;
        let hi = self.max_y.saturating_sub(self.min_margin).max(lo);
        (lo, hi)
    }

    pub fn contains(&self, p: &Position) -> bool {
        let (x0, x1) = self.x_range();
        let (y0, y1) = self.y_range();
        (x0..=x1).contains(&p.x) && (y0..=y1).contains(&p.y)
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new(800, 600, 20, 80)
    }
}

/// Uniform random spot with `min_margin <= x <= max_x - min_margin` and
/// `top_margin <= y <= max_y - min_margin`.
pub fn random_position<R: Rng + ?Sized>(bounds: &Bounds, rng: &mut R) -> Position {
    let (x0, x1) = bounds.x_range();
    let (y0, y1) = bounds.y_range();
    Position {
        x: rng.gen_range(x0..=x1),
        y: rng.gen_range(y0..=y1),
    }
}

/// Where new targets go. Games only depend on this seam, so tests can pin
/// targets to known coordinates.
pub trait PositionSource {
    fn next_position(&mut self, bounds: &Bounds) -> Position;
}

/// Production source backed by any `rand` generator.
#[derive(Debug)]
pub struct RandomPositions<R: Rng> {
    rng: R,
}

impl<R: Rng> RandomPositions<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> PositionSource for RandomPositions<R> {
    fn next_position(&mut self, bounds: &Bounds) -> Position {
        random_position(bounds, &mut self.rng)
    }
}

/// Cycles through a fixed list of positions.
#[derive(Debug, Clone)]
pub struct FixedPositions {
    positions: Vec<Position>,
    next: usize,
}

impl FixedPositions {
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions, next: 0 }
    }
}

impl PositionSource for FixedPositions {
    fn next_position(&mut self, bounds: &Bounds) -> Position {
        if self.positions.is_empty() {
            let (x, _) = bounds.x_range();
            let (y, _) = bounds.y_range();
            return Position { x, y };
        }
        let p = self.positions[self.next % self.positions.len()];
        self.next += 1;
        p
    }
}
