// Per-invocation scratch arena.
//
// Handlers get two allocators: the global heap for anything that must
// outlive the invocation (owned `String`/`Vec` values, released by
// ordinary ownership), and this arena for scratch that dies with the
// invocation. The arena is reset in place between invocations so warm
// allocations stay O(1); the retention cap below keeps one pathological
// invocation from inflating resident memory for the rest of the
// sandbox's life.

use bumpalo::Bump;

/// Minimum retained capacity that is never released on reset.
const RETAIN_FLOOR: usize = 1 << 20; // 1 MiB

/// Bump arena handed to handlers through the invocation context.
///
/// Allocation goes through `&self`, so the context can share the arena
/// immutably; reset requires `&mut self` and is therefore only reachable
/// from the invocation loop, never from inside a handler.
///
/// # Examples
///
/// ```
/// use bolt_lambda_runtime::InvocationArena;
///
/// let mut arena = InvocationArena::new();
/// let greeting = arena.alloc_str("hello");
/// assert_eq!(greeting, "hello");
/// assert!(arena.used() > 0);
///
/// arena.reset();
/// assert_eq!(arena.used(), 0);
/// ```
pub struct InvocationArena {
    bump: Bump,
    high_water: usize,
}

impl InvocationArena {
    /// Creates an empty arena. Pages are mapped on first allocation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bump: Bump::new(),
            high_water: 0,
        }
    }

    /// Copies `bytes` into the arena.
    pub fn alloc_slice(&self, bytes: &[u8]) -> &mut [u8] {
        self.bump.alloc_slice_copy(bytes)
    }

    /// Copies `s` into the arena.
    pub fn alloc_str(&self, s: &str) -> &mut str {
        self.bump.alloc_str(s)
    }

    /// The underlying bump allocator, for typed allocation.
    #[must_use]
    pub fn bump(&self) -> &Bump {
        &self.bump
    }

    /// Bytes currently allocated. Zero between invocations.
    #[must_use]
    pub fn used(&self) -> usize {
        self.bump.allocated_bytes()
    }

    /// Largest per-invocation usage whose pages were retained.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Returns the cursor to base without releasing pages, unless this
    /// invocation blew past the retention cap, in which case the pages
    /// are handed back to the OS and the arena starts over.
    pub fn reset(&mut self) {
        let used = self.bump.allocated_bytes();
        if release_pages(used, self.high_water) {
            self.bump = Bump::new();
        } else {
            self.bump.reset();
            self.high_water = self.high_water.max(used);
        }
    }
}

impl Default for InvocationArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Retention policy: keep pages while usage stays under the larger of
/// [`RETAIN_FLOOR`] and twice the high-water mark. An invocation that
/// exceeds the cap is treated as an outlier: its pages are released and
/// it does not raise the mark.
fn release_pages(used: usize, high_water: usize) -> bool {
    used > RETAIN_FLOOR.max(high_water.saturating_mul(2))
}

static_assertions::assert_impl_all!(InvocationArena: Send);
