use super::DistanceMetric;

/// Row-major array of fixed-width vectors with brute-force search.
///
/// Rows are addressed by insertion position. There is no row removal: callers
/// that need to drop rows rebuild a new index from the survivors.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dims: usize,
    metric: DistanceMetric,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize, metric: DistanceMetric) -> Self {
        Self {
            dims,
            metric,
            data: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        if self.dims == 0 {
            0
        } else {
            self.data.len() / self.dims
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Appends one row. The caller guarantees `vector.len() == dims`.
    pub fn add(&mut self, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.dims);
        self.data.extend_from_slice(vector);
    }

    pub fn vector(&self, row: usize) -> &[f32] {
        &self.data[row * self.dims..(row + 1) * self.dims]
    }

    /// Up to `k` `(row, distance)` pairs, nearest first. Equal distances keep
    /// insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let k = k.min(self.len());
        if k == 0 || query.len() != self.dims {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dims)
            .enumerate()
            .map(|(row, vector)| (row, self.metric.distance(query, vector)))
            .collect();

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}
