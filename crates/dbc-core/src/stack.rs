//! Thread-local stack of in-flight contracted calls
//!
//! Each invocation pushes a frame on entry and pops it when its guard drops,
//! including during unwinding. Frames are strictly LIFO per thread, so nested
//! and recursive calls each see their own frame and never share a snapshot.

use std::cell::{Cell, RefCell};

#[derive(Debug, Clone)]
struct Frame {
    id: u64,
    callable: String,
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static NEXT_ID: Cell<u64> = const { Cell::new(0) };
}

/// Keeps one frame on the current thread's stack for as long as it lives
#[derive(Debug)]
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard {
    id: u64,
}

impl FrameGuard {
    pub fn push(callable: &str) -> Self {
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id.wrapping_add(1));
            id
        });
        FRAMES.with(|frames| {
            frames.borrow_mut().push(Frame {
                id,
                callable: callable.to_string(),
            })
        });
        tracing::trace!(callable, depth = depth(), "frame pushed");
        Self { id }
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            match frames.last() {
                Some(top) if top.id == self.id => {
                    frames.pop();
                }
                _ => {
                    // Out-of-order drop: remove our own frame, leave the rest
                    if let Some(position) = frames.iter().rposition(|f| f.id == self.id) {
                        frames.remove(position);
                    }
                }
            }
        });
    }
}

/// Number of contracted calls in flight on this thread
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Names of the in-flight contracted calls, outermost first
pub fn call_path() -> Vec<String> {
    FRAMES.with(|frames| frames.borrow().iter().map(|f| f.callable.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_pop() {
        assert_eq!(depth(), 0);
        {
            let _outer = FrameGuard::push("f");
            let _inner = FrameGuard::push("g");
            assert_eq!(call_path(), vec!["f", "g"]);
        }
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_out_of_order_drop_removes_own_frame() {
        let outer = FrameGuard::push("f");
        let inner = FrameGuard::push("g");
        drop(outer);
        assert_eq!(call_path(), vec!["g"]);
        drop(inner);
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_frame_popped_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _guard = FrameGuard::push("boom");
            panic!("callee panicked");
        });
        assert!(result.is_err());
        assert_eq!(depth(), 0);
    }

    #[test]
    fn test_stacks_are_per_thread() {
        let _guard = FrameGuard::push("main");
        let other = std::thread::spawn(depth).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(depth(), 1);
    }
}
