use crate::buffer::FrameId;

pub mod lru_k;

/// Frame replacement policy. Implementations serialize internally; all
/// methods take `&self`.
///
/// Passing a frame id at or beyond the capacity the replacer was built
/// with, or removing a non-evictable frame, is a contract violation and
/// panics.
pub trait Replacer {
    /// Record an access to `frame_id`, tracking it if unseen. New frames
    /// start out non-evictable.
    fn record_access(&self, frame_id: FrameId);

    /// Pick the evictable frame with the largest backward k-distance,
    /// drop its history, and return it. `None` when nothing is evictable.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle evictability. Only true↔false transitions change `size`.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Drop a specific frame's history regardless of its k-distance.
    /// No-op for untracked frames; the frame must be evictable.
    fn remove(&self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}
