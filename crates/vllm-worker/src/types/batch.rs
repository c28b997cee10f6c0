/// Chunk-size growth policy for one streaming generation.
///
/// Starts small so the first chunk leaves quickly, then grows geometrically
/// toward `max_batch_size` to amortize per-chunk overhead as the stream
/// progresses. The generation loop owns the cadence: it must call
/// [`BatchSize::update`] exactly once per emitted chunk; this type never
/// drives anything itself.
#[derive(Clone, Debug)]
pub struct BatchSize {
    max_batch_size: usize,
    min_batch_size: usize,
    batch_size_growth_factor: f64,
    is_dynamic: bool,
    current_batch_size: f64,
}

impl BatchSize {
    /// Build a policy, rejecting configurations the reference left undefined.
    pub fn new(
        max_batch_size: usize,
        min_batch_size: usize,
        batch_size_growth_factor: f64,
    ) -> crate::Result<Self> {
        if max_batch_size == 0 {
            return Err(crate::Error::invalid_configuration(
                "max_batch_size must be >= 1",
            ));
        }
        if !batch_size_growth_factor.is_finite() || batch_size_growth_factor <= 0.0 {
            return Err(crate::Error::invalid_configuration(format!(
                "batch_size_growth_factor must be finite and > 0, got {batch_size_growth_factor}"
            )));
        }
        if max_batch_size < min_batch_size {
            return Err(crate::Error::invalid_configuration(format!(
                "max_batch_size ({max_batch_size}) must be >= min_batch_size ({min_batch_size})"
            )));
        }

        let is_dynamic = batch_size_growth_factor > 1.0
            && min_batch_size >= 1
            && max_batch_size > min_batch_size;
        let current_batch_size = if is_dynamic {
            min_batch_size as f64
        } else {
            max_batch_size as f64
        };

        Ok(Self {
            max_batch_size,
            min_batch_size,
            batch_size_growth_factor,
            is_dynamic,
            current_batch_size,
        })
    }

    pub fn is_dynamic(&self) -> bool {
        self.is_dynamic
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn min_batch_size(&self) -> usize {
        self.min_batch_size
    }

    /// Raw policy state. Fractional between growth steps when the growth
    /// factor is not an integer; see [`BatchSize::chunk_capacity`] for the
    /// effective whole-token capacity.
    pub fn current_batch_size(&self) -> f64 {
        self.current_batch_size
    }

    /// Number of buffered items that fills the current chunk.
    ///
    /// The reference compares an integer length against the float state with
    /// `>=`, which rounds the threshold up; `ceil` preserves that.
    pub fn chunk_capacity(&self) -> usize {
        (self.current_batch_size.ceil() as usize).min(self.max_batch_size)
    }

    /// Advance the policy one chunk boundary. No-op in static mode.
    pub fn update(&mut self) {
        if self.is_dynamic {
            self.current_batch_size = (self.current_batch_size * self.batch_size_growth_factor)
                .min(self.max_batch_size as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BatchSize;

    #[test]
    fn dynamic_when_all_conditions_hold() {
        let batch = BatchSize::new(16, 1, 2.0).expect("valid config");
        assert!(batch.is_dynamic());
        assert_eq!(batch.current_batch_size(), 1.0);
        assert_eq!(batch.chunk_capacity(), 1);
    }

    #[test]
    fn static_when_growth_factor_not_above_one() {
        let batch = BatchSize::new(16, 1, 1.0).expect("valid config");
        assert!(!batch.is_dynamic());
        assert_eq!(batch.current_batch_size(), 16.0);
    }

    #[test]
    fn static_when_floor_is_zero() {
        let batch = BatchSize::new(16, 0, 2.0).expect("valid config");
        assert!(!batch.is_dynamic());
        assert_eq!(batch.current_batch_size(), 16.0);
    }

    #[test]
    fn static_when_ceiling_equals_floor() {
        let mut batch = BatchSize::new(4, 4, 2.0).expect("valid config");
        assert!(!batch.is_dynamic());
        for _ in 0..5 {
            batch.update();
            assert_eq!(batch.current_batch_size(), 4.0);
        }
    }

    #[test]
    fn doubling_sequence_clamps_at_ceiling() {
        let mut batch = BatchSize::new(16, 1, 2.0).expect("valid config");
        let mut seen = vec![batch.current_batch_size()];
        for _ in 0..6 {
            batch.update();
            seen.push(batch.current_batch_size());
        }
        assert_eq!(seen, vec![1.0, 2.0, 4.0, 8.0, 16.0, 16.0, 16.0]);
    }

    #[test]
    fn growth_is_monotone_and_bounded() {
        let mut batch = BatchSize::new(50, 1, 3.0).expect("valid config");
        let mut prev = batch.current_batch_size();
        let mut reached_ceiling = false;
        for _ in 0..32 {
            batch.update();
            let cur = batch.current_batch_size();
            assert!(cur >= prev);
            assert!(cur <= 50.0);
            prev = cur;
            if cur == 50.0 {
                reached_ceiling = true;
            }
        }
        assert!(reached_ceiling, "growth > 1 must reach the ceiling");
    }

    #[test]
    fn static_update_is_idempotent() {
        let mut batch = BatchSize::new(8, 8, 4.0).expect("valid config");
        let before = batch.current_batch_size();
        for _ in 0..10 {
            batch.update();
        }
        assert_eq!(batch.current_batch_size(), before);
    }

    #[test]
    fn fractional_growth_rounds_capacity_up() {
        let mut batch = BatchSize::new(8, 1, 1.5).expect("valid config");
        batch.update();
        assert_eq!(batch.current_batch_size(), 1.5);
        assert_eq!(batch.chunk_capacity(), 2);
    }

    #[test]
    fn rejects_zero_ceiling() {
        BatchSize::new(0, 0, 2.0).expect_err("zero ceiling should be rejected");
    }

    #[test]
    fn rejects_non_positive_growth() {
        BatchSize::new(16, 1, 0.0).expect_err("zero growth should be rejected");
        BatchSize::new(16, 1, -2.0).expect_err("negative growth should be rejected");
        BatchSize::new(16, 1, f64::NAN).expect_err("NaN growth should be rejected");
    }

    #[test]
    fn rejects_ceiling_below_floor() {
        BatchSize::new(2, 4, 2.0).expect_err("ceiling < floor should be rejected");
    }
}
