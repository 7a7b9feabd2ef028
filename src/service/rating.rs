// service/rating.rs
use serde::Serialize;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// Out-of-range ratings are clamped, never rejected.
pub fn clamp_rating(rating: i32) -> i32 {
    rating.clamp(MIN_RATING, MAX_RATING)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingAggregate {
    pub average: f64,
    pub count: i32,
}

impl RatingAggregate {
    pub fn new(average: f64, count: i32) -> Self {
        Self { average, count }
    }

    /// Fold one more rating into the rolling average.
    ///
    /// Pure: the caller must persist `average` and `count` together.
    pub fn update(self, new_rating: i32) -> RatingAggregate {
        let rating = clamp_rating(new_rating) as f64;
        let count = self.count.max(0);
        let total = self.average * count as f64 + rating;
        let new_count = count + 1;

        RatingAggregate {
            average: total / new_count as f64,
            count: new_count,
        }
    }
}

/// `(average, count)` after folding in `new_rating`; used by the stores.
pub fn update(current_average: f64, current_count: i32, new_rating: i32) -> (f64, i32) {
    let next = RatingAggregate::new(current_average, current_count).update(new_rating);
    (next.average, next.count)
}
