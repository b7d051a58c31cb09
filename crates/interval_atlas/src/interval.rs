use std::collections::{BTreeMap, BTreeSet};

/// A half-open `[begin, end)` span inside one layer of an [`IntervalAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    begin: u32,
    end: u32,
    layer: u32,
}

impl Interval {
    pub const fn range(&self) -> (u32, u32) {
        (self.begin, self.end)
    }

    pub const fn layer(&self) -> u32 {
        self.layer
    }

    pub const fn len(&self) -> u32 {
        self.end - self.begin
    }

    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalAllocError {
    /// `layer_length` was called on an allocator configured with a fixed
    /// number of layers (there is no single dynamically-sized layer to grow).
    NotDynamicallySized,
    /// `number_layers` was called on an allocator configured with one
    /// dynamically-sized layer (layers are grown by `layer_length` instead).
    DynamicallySized,
    ShrinkNotSupported,
}

impl std::fmt::Display for IntervalAllocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntervalAllocError::NotDynamicallySized => {
                write!(f, "layer_length requires a single dynamically-sized layer")
            }
            IntervalAllocError::DynamicallySized => {
                write!(f, "number_layers requires a fixed-layer-count allocator")
            }
            IntervalAllocError::ShrinkNotSupported => {
                write!(f, "layer_length cannot shrink a layer below its current length")
            }
        }
    }
}

impl std::error::Error for IntervalAllocError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LayerReport {
    pub length: u32,
    pub allocated: u32,
    pub free: u32,
}

#[derive(Debug, Clone, Default)]
pub struct IntervalAllocatorReport {
    pub layers: Vec<LayerReport>,
}

impl IntervalAllocatorReport {
    pub fn total_allocated(&self) -> u32 {
        self.layers.iter().map(|l| l.allocated).sum()
    }
}

struct Layer {
    length: u32,
    // free ranges keyed by (size, begin) for O(log k) best-fit-by-smallest lookup
    free_by_size: BTreeSet<(u32, u32)>,
    // free ranges keyed by begin, for O(log k) neighbour coalescing on release
    free_by_begin: BTreeMap<u32, u32>,
}

impl Layer {
    fn new(length: u32) -> Self {
        let mut layer = Self {
            length: 0,
            free_by_size: BTreeSet::new(),
            free_by_begin: BTreeMap::new(),
        };
        layer.grow_to(length);
        layer
    }

    fn insert_free(&mut self, begin: u32, end: u32) {
        if begin == end {
            return;
        }
        self.free_by_size.insert((end - begin, begin));
        self.free_by_begin.insert(begin, end);
    }

    fn remove_free(&mut self, begin: u32, end: u32) {
        self.free_by_size.remove(&(end - begin, begin));
        self.free_by_begin.remove(&begin);
    }

    fn grow_to(&mut self, new_length: u32) {
        debug_assert!(new_length >= self.length);
        if new_length == self.length {
            return;
        }
        // extend (or create) the free run that ends at the old length
        if let Some((&prev_begin, &prev_end)) = self
            .free_by_begin
            .range(..self.length)
            .next_back()
            .filter(|&(_, &end)| end == self.length)
        {
            self.remove_free(prev_begin, prev_end);
            self.insert_free(prev_begin, new_length);
        } else {
            self.insert_free(self.length, new_length);
        }
        self.length = new_length;
    }

    fn allocate(&mut self, size: u32) -> Option<(u32, u32)> {
        if size == 0 {
            return None;
        }
        let &(found_size, found_begin) = self.free_by_size.range((size, 0)..).next()?;
        self.remove_free(found_begin, found_begin + found_size);
        let allocated_end = found_begin + size;
        if allocated_end < found_begin + found_size {
            self.insert_free(allocated_end, found_begin + found_size);
        }
        Some((found_begin, allocated_end))
    }

    fn release(&mut self, begin: u32, end: u32) {
        let mut new_begin = begin;
        let mut new_end = end;

        // coalesce with the free run immediately to the left
        if let Some((&left_begin, &left_end)) = self
            .free_by_begin
            .range(..new_begin)
            .next_back()
            .filter(|&(_, &left_end)| left_end == new_begin)
        {
            self.remove_free(left_begin, left_end);
            new_begin = left_begin;
        }

        // coalesce with the free run immediately to the right
        if let Some(&right_end) = self.free_by_begin.get(&new_end) {
            self.remove_free(new_end, right_end);
            new_end = right_end;
        }

        self.insert_free(new_begin, new_end);
    }

    fn report(&self) -> LayerReport {
        let free: u32 = self.free_by_size.iter().map(|&(size, _)| size).sum();
        LayerReport {
            length: self.length,
            allocated: self.length - free,
            free,
        }
    }
}

enum LayerPolicy {
    /// A single layer that grows via `layer_length`.
    Dynamic,
    /// A fixed count of equal-length layers, grown via `number_layers`.
    FixedCount { layer_length: u32 },
}

/// A layered 1-D allocator: each layer has a fixed length at any
/// given moment; `allocate` returns the first layer with a large-enough free
/// run, chosen by smallest-fit to reduce fragmentation; `release` coalesces
/// with immediate neighbours. Ordered free-list keyed on `(size, begin)`
/// gives O(log k) allocate/release.
pub struct IntervalAllocator {
    layers: Vec<Layer>,
    policy: LayerPolicy,
}

impl IntervalAllocator {
    /// `initial_number_layers <= 0` configures a single dynamically-sized
    /// layer grown with [`Self::layer_length`]; otherwise allocates that many
    /// fixed-length layers, grown in count with [`Self::number_layers`].
    pub fn new(layer_length: u32, initial_number_layers: i32) -> Self {
        if initial_number_layers <= 0 {
            Self {
                layers: vec![Layer::new(layer_length)],
                policy: LayerPolicy::Dynamic,
            }
        } else {
            let layers = (0..initial_number_layers)
                .map(|_| Layer::new(layer_length))
                .collect();
            Self {
                layers,
                policy: LayerPolicy::FixedCount { layer_length },
            }
        }
    }

    pub fn allocate(&mut self, size: u32) -> Option<Interval> {
        for (layer_index, layer) in self.layers.iter_mut().enumerate() {
            if let Some((begin, end)) = layer.allocate(size) {
                return Some(Interval {
                    begin,
                    end,
                    layer: layer_index as u32,
                });
            }
        }
        None
    }

    pub fn release(&mut self, interval: Interval) {
        let layer = &mut self.layers[interval.layer as usize];
        layer.release(interval.begin, interval.end);
    }

    /// Grow the single dynamically-sized layer. Errors if this allocator was
    /// configured with a fixed layer count instead.
    pub fn layer_length(&mut self, new_length: u32) -> Result<(), IntervalAllocError> {
        match self.policy {
            LayerPolicy::Dynamic => {
                let layer = &mut self.layers[0];
                if new_length < layer.length {
                    return Err(IntervalAllocError::ShrinkNotSupported);
                }
                layer.grow_to(new_length);
                Ok(())
            }
            LayerPolicy::FixedCount { .. } => Err(IntervalAllocError::NotDynamicallySized),
        }
    }

    /// Set the total layer count, appending fresh empty layers as needed.
    /// Errors if this allocator was configured with one dynamically-sized
    /// layer instead.
    pub fn number_layers(&mut self, n: u32) -> Result<(), IntervalAllocError> {
        match self.policy {
            LayerPolicy::FixedCount { layer_length } => {
                while (self.layers.len() as u32) < n {
                    self.layers.push(Layer::new(layer_length));
                }
                Ok(())
            }
            LayerPolicy::Dynamic => Err(IntervalAllocError::DynamicallySized),
        }
    }

    pub fn number_of_layers(&self) -> u32 {
        self.layers.len() as u32
    }

    /// Global diagnostic: total allocated size across all layers.
    pub fn check(&self) -> IntervalAllocatorReport {
        IntervalAllocatorReport {
            layers: self.layers.iter().map(Layer::report).collect(),
        }
    }

    /// Per-layer diagnostic.
    pub fn check_layer(&self, layer: u32) -> LayerReport {
        self.layers[layer as usize].report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_allocate_release_grow_layers() {
        // scenario 1: layer_length=16, layers=1.
        let mut allocator = IntervalAllocator::new(16, 1);

        let a = allocator.allocate(5).unwrap();
        assert_eq!(a.range(), (0, 5));

        let b = allocator.allocate(4).unwrap();
        assert_eq!(b.range(), (5, 9));

        allocator.release(a);

        // after releasing [0,5), remaining free space on layer 0 is
        // [0,5) and [9,16) -- neither holds 6, so allocate(6) must fail
        assert!(allocator.allocate(6).is_none());

        allocator.number_layers(2).unwrap();
        let c = allocator.allocate(6).unwrap();
        assert_eq!(c.range(), (0, 6));
        assert_eq!(c.layer(), 1);
    }

    #[test]
    fn release_coalesces_with_both_neighbours() {
        let mut allocator = IntervalAllocator::new(30, 1);
        let a = allocator.allocate(10).unwrap();
        let b = allocator.allocate(10).unwrap();
        let c = allocator.allocate(10).unwrap();

        allocator.release(a);
        allocator.release(c);
        allocator.release(b);

        // fully coalesced back into one free run spanning the whole layer
        let whole = allocator.allocate(30).unwrap();
        assert_eq!(whole.range(), (0, 30));
    }

    #[test]
    fn check_reports_union_and_disjointness() {
        let mut allocator = IntervalAllocator::new(20, 1);
        let _a = allocator.allocate(8).unwrap();
        let _b = allocator.allocate(5).unwrap();
        let report = allocator.check();
        assert_eq!(report.layers.len(), 1);
        assert_eq!(report.layers[0].length, 20);
        assert_eq!(report.layers[0].allocated, 13);
        assert_eq!(report.layers[0].free, 7);
    }

    #[test]
    fn layer_length_rejected_on_fixed_layer_allocator() {
        let mut allocator = IntervalAllocator::new(16, 2);
        assert_eq!(
            allocator.layer_length(32).unwrap_err(),
            IntervalAllocError::NotDynamicallySized
        );
    }

    #[test]
    fn number_layers_rejected_on_dynamic_allocator() {
        let mut allocator = IntervalAllocator::new(16, 0);
        assert_eq!(
            allocator.number_layers(2).unwrap_err(),
            IntervalAllocError::DynamicallySized
        );
    }

    #[test]
    fn dynamic_layer_grows_and_serves_larger_allocations() {
        let mut allocator = IntervalAllocator::new(4, 0);
        let a = allocator.allocate(4).unwrap();
        assert!(allocator.allocate(1).is_none());

        allocator.layer_length(8).unwrap();
        let b = allocator.allocate(4).unwrap();
        assert_eq!(b.range(), (4, 8));

        allocator.release(a);
        allocator.release(b);
        let whole = allocator.allocate(8).unwrap();
        assert_eq!(whole.range(), (0, 8));
    }
}
