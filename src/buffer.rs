use log::{debug, warn};
use std::collections::VecDeque;

use crate::point::Point;

/// Points accumulated between two successful flushes.
///
/// Unbounded unless `max_points` is set; a bounded batch drops its oldest
/// point to make room for a new one.
pub struct PointBatch {
    /// Points in arrival order
    points: VecDeque<Point>,

    /// Upper bound on retained points
    max_points: Option<usize>,

    /// Points dropped since the batch was created
    dropped: u64,
}

impl PointBatch {
    /// Create an unbounded batch
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a batch with an optional bound
    pub fn with_limit(max_points: Option<usize>) -> Self {
        Self {
            points: VecDeque::new(),
            max_points: max_points.filter(|max| *max > 0),
            dropped: 0,
        }
    }

    /// Append a point, evicting the oldest one when the bound is reached
    pub fn push(&mut self, point: Point) {
        if let Some(max) = self.max_points {
            if self.points.len() >= max {
                self.points.pop_front();
                self.dropped += 1;
                // Warn on the first drop and then every hundred
                if self.dropped % 100 == 1 {
                    warn!(
                        "Batch bound of {} points reached, {} oldest points dropped so far",
                        max, self.dropped
                    );
                }
            }
        }
        self.points.push_back(point);
    }

    /// Contiguous view of the batch, oldest first
    pub fn as_slice(&mut self) -> &[Point] {
        self.points.make_contiguous()
    }

    /// Replace the batch with a fresh one, returning what it held
    pub fn take(&mut self) -> Vec<Point> {
        if self.dropped > 0 {
            debug!("Starting a new batch after {} dropped points", self.dropped);
        }
        self.dropped = 0;
        std::mem::take(&mut self.points).into()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points dropped because of the bound
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for PointBatch {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn point(n: i64) -> Point {
        Point::new("m", Utc::now()).field("n", n)
    }

    #[test]
    fn unbounded_batch_keeps_everything() {
        let mut batch = PointBatch::new();
        for n in 0..1000 {
            batch.push(point(n));
        }
        assert_eq!(batch.len(), 1000);
        assert_eq!(batch.dropped(), 0);
    }

    #[test]
    fn bounded_batch_drops_oldest() {
        let mut batch = PointBatch::with_limit(Some(3));
        for n in 0..5 {
            batch.push(point(n));
        }

        assert_eq!(batch.dropped(), 2);
        let kept: Vec<_> = batch.as_slice().iter().map(|p| p.fields["n"].clone()).collect();
        assert_eq!(
            kept,
            vec![
                crate::point::FieldValue::Integer(2),
                crate::point::FieldValue::Integer(3),
                crate::point::FieldValue::Integer(4),
            ]
        );
    }

    #[test]
    fn take_starts_a_fresh_batch() {
        let mut batch = PointBatch::with_limit(Some(1));
        batch.push(point(1));
        batch.push(point(2));

        let taken = batch.take();
        assert_eq!(taken.len(), 1);
        assert!(batch.is_empty());
        assert_eq!(batch.dropped(), 0);
    }
}
