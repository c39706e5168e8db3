use crate::frame::Frame;

/// Frames accumulated since the last window boundary.
#[derive(Debug, Clone)]
pub struct ProcessingWindow {
    capacity: usize,
    frames: Vec<Frame>,
    /// Frames pushed over the lifetime of the window, drained or not.
    consumed: usize,
}

impl ProcessingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: Vec::with_capacity(capacity),
            consumed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a frame; returns true once the window is full.
    pub fn push(&mut self, frame: Frame) -> bool {
        self.frames.push(frame);
        self.consumed += 1;
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Take the accumulated frames, leaving the window empty.
    pub fn drain(&mut self) -> Vec<Frame> {
        std::mem::replace(&mut self.frames, Vec::with_capacity(self.capacity))
    }

    /// Discard the accumulated frames; returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::flat_frame;

    #[test]
    fn test_push_reports_full_at_capacity() {
        let mut window = ProcessingWindow::new(3);
        assert!(!window.push(flat_frame(0, 0.0, 0.0, 0)));
        assert!(!window.push(flat_frame(1, 0.0, 0.0, 0)));
        assert!(window.push(flat_frame(2, 0.0, 0.0, 0)));
        let drained = window.drain();
        assert_eq!(drained.iter().map(|f| f.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(window.is_empty());
        assert_eq!(window.consumed(), 3);
    }

    #[test]
    fn test_clear_counts_dropped_frames() {
        let mut window = ProcessingWindow::new(5);
        window.push(flat_frame(0, 0.0, 0.0, 0));
        window.push(flat_frame(1, 0.0, 0.0, 0));
        assert_eq!(window.clear(), 2);
        assert_eq!(window.len(), 0);
        assert_eq!(window.consumed(), 2);
    }
}
