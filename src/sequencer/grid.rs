// Step grid - one row of on/off steps per drum pad

/// Number of pad rows (drum voices)
pub const NUM_PADS: usize = 16;
/// Number of step columns; also the length of one measure
pub const NUM_STEPS: usize = 32;

/// Fixed `NUM_PADS x NUM_STEPS` matrix. The grid encodes onsets only, not note length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepGrid {
    cells: [[bool; NUM_STEPS]; NUM_PADS],
}

impl StepGrid {
    pub fn new() -> Self {
        Self {
            cells: [[false; NUM_STEPS]; NUM_PADS],
        }
    }

    pub fn num_pads(&self) -> usize {
        NUM_PADS
    }

    pub fn num_steps(&self) -> usize {
        NUM_STEPS
    }

    /// Out-of-range coordinates read as off
    pub fn get(&self, pad: usize, step: usize) -> bool {
        self.cells
            .get(pad)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Out-of-range coordinates are ignored
    pub fn set(&mut self, pad: usize, step: usize, value: bool) {
        if let Some(cell) = self.cells.get_mut(pad).and_then(|row| row.get_mut(step)) {
            *cell = value;
        }
    }

    /// Flip one cell, returning its new value (None when out of range)
    pub fn toggle(&mut self, pad: usize, step: usize) -> Option<bool> {
        let cell = self.cells.get_mut(pad)?.get_mut(step)?;
        *cell = !*cell;
        Some(*cell)
    }

    pub fn row(&self, pad: usize) -> Option<&[bool; NUM_STEPS]> {
        self.cells.get(pad)
    }

    /// Pads with an onset at `step`, in pad order
    pub fn active_pads(&self, step: usize) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, row)| row.get(step).copied().unwrap_or(false))
            .map(|(pad, _)| pad)
    }

    pub fn clear(&mut self) {
        self.cells = [[false; NUM_STEPS]; NUM_PADS];
    }
}

impl Default for StepGrid {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_starts_empty() {
        let grid = StepGrid::new();
        assert_eq!(grid.num_pads(), 16);
        assert_eq!(grid.num_steps(), 32);
        assert!((0..NUM_STEPS).all(|s| grid.active_pads(s).next().is_none()));
    }

    #[test]
    fn test_grid_toggle() {
        let mut grid = StepGrid::new();
        assert_eq!(grid.toggle(3, 7), Some(true));
        assert!(grid.get(3, 7));
        assert_eq!(grid.toggle(3, 7), Some(false));
        assert!(!grid.get(3, 7));
    }

    #[test]
    fn test_out_of_range_is_ignored() {
        let mut grid = StepGrid::new();
        assert_eq!(grid.toggle(16, 0), None);
        assert_eq!(grid.toggle(0, 32), None);
        grid.set(99, 99, true);
        assert!(!grid.get(99, 99));
    }

    #[test]
    fn test_active_pads_column() {
        let mut grid = StepGrid::new();
        grid.set(0, 4, true);
        grid.set(5, 4, true);
        grid.set(5, 5, true);

        let pads: Vec<_> = grid.active_pads(4).collect();
        assert_eq!(pads, vec![0, 5]);
    }
}
