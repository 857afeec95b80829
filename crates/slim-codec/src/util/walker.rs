//! N-dimensional array storage and row-major traversal.
//!
//! Encoders call [`walk_write`] and decoders call [`walk_read`]; both visit
//! cells in the order produced by [`IndexWalker`] (last index varies
//! fastest), so decode order always mirrors encode order.

/// Number of cells in an array of the given shape, or `None` on overflow.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// A dense N-dimensional array stored in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T> NdArray<T> {
    /// Wraps row-major `data`, or returns it back if the shape doesn't fit.
    pub fn from_vec(shape: Vec<usize>, data: Vec<T>) -> Result<Self, Vec<T>> {
        if shape.is_empty() || element_count(&shape) != Some(data.len()) {
            return Err(data);
        }
        Ok(Self { shape, data })
    }

    /// Creates a one-dimensional array.
    pub fn from_elements(data: Vec<T>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Creates an array with every cell set to `fill`.
    pub fn filled(shape: Vec<usize>, fill: T) -> Option<Self>
    where
        T: Clone,
    {
        if shape.is_empty() {
            return None;
        }
        let len = element_count(&shape)?;
        Some(Self {
            shape,
            data: vec![fill; len],
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major view of all cells.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.data.iter_mut()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Row-major offset of a multi-index, or `None` if out of bounds.
    pub fn offset(&self, index: &[usize]) -> Option<usize> {
        if index.len() != self.shape.len() {
            return None;
        }
        let mut offset = 0usize;
        for (&i, &dim) in index.iter().zip(&self.shape) {
            if i >= dim {
                return None;
            }
            offset = offset * dim + i;
        }
        Some(offset)
    }

    pub fn get(&self, index: &[usize]) -> Option<&T> {
        self.offset(index).map(|o| &self.data[o])
    }

    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut T> {
        match self.offset(index) {
            Some(o) => Some(&mut self.data[o]),
            None => None,
        }
    }
}

/// Iterator over every multi-index of a shape in row-major order.
#[derive(Debug, Clone)]
pub struct IndexWalker {
    shape: Vec<usize>,
    current: Vec<usize>,
    remaining: usize,
}

impl IndexWalker {
    /// Creates a walker; an overflowing shape yields nothing.
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            current: vec![0; shape.len()],
            remaining: if shape.is_empty() {
                0
            } else {
                element_count(shape).unwrap_or(0)
            },
        }
    }
}

impl Iterator for IndexWalker {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.current.clone();
        self.remaining -= 1;
        // Odometer step: bump the last axis, carry leftwards.
        for axis in (0..self.shape.len()).rev() {
            self.current[axis] += 1;
            if self.current[axis] < self.shape[axis] {
                break;
            }
            self.current[axis] = 0;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for IndexWalker {}

/// Visits every cell of `array` in row-major order.
pub fn walk_write<T, E>(
    array: &NdArray<T>,
    mut visit: impl FnMut(&[usize], &T) -> Result<(), E>,
) -> Result<(), E> {
    for (index, cell) in IndexWalker::new(&array.shape).zip(&array.data) {
        visit(&index, cell)?;
    }
    Ok(())
}

/// Builds an array of `shape` by asking `fill` for each cell in row-major order.
///
/// The caller is responsible for bounding the shape before allocation.
pub fn walk_read<T, E>(
    shape: Vec<usize>,
    mut fill: impl FnMut(&[usize]) -> Result<T, E>,
) -> Result<NdArray<T>, E> {
    let mut data = Vec::with_capacity(element_count(&shape).unwrap_or(0));
    for index in IndexWalker::new(&shape) {
        data.push(fill(&index)?);
    }
    Ok(NdArray { shape, data })
}
