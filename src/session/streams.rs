use std::collections::HashMap;

use super::transport::MediaKind;

/// Descriptor for one participant's inbound media, used only for UI
/// attachment. The coordinator does not own the underlying tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub participant_id: String,
    pub audio: bool,
    pub video: bool,
}

/// Insertion-ordered registry of remote streams with a visible paging
/// window (slices of three by default).
pub struct StreamRegistry {
    order: Vec<String>,
    by_id: HashMap<String, RemoteStream>,
    page_offset: usize,
    page_size: usize,
}

impl StreamRegistry {
    /// `page_size` of zero disables paging and shows everything.
    pub fn new(page_size: usize) -> Self {
        Self {
            order: Vec::new(),
            by_id: HashMap::new(),
            page_offset: 0,
            page_size,
        }
    }

    /// Record inbound media for a participant. Returns true when this is the
    /// participant's first stream.
    pub fn upsert(&mut self, participant_id: &str, kind: MediaKind) -> bool {
        match self.by_id.get_mut(participant_id) {
            Some(stream) => {
                match kind {
                    MediaKind::Audio => stream.audio = true,
                    MediaKind::Video => stream.video = true,
                }
                false
            }
            None => {
                self.order.push(participant_id.to_string());
                self.by_id.insert(
                    participant_id.to_string(),
                    RemoteStream {
                        participant_id: participant_id.to_string(),
                        audio: kind == MediaKind::Audio,
                        video: kind == MediaKind::Video,
                    },
                );
                true
            }
        }
    }

    pub fn remove(&mut self, participant_id: &str) -> bool {
        let removed = self.by_id.remove(participant_id).is_some();
        if removed {
            self.order.retain(|id| id != participant_id);
            self.clamp_offset();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_id.clear();
        self.page_offset = 0;
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.by_id.contains_key(participant_id)
    }

    /// The currently visible window, in insertion order.
    pub fn visible(&self) -> Vec<RemoteStream> {
        let ids: &[String] = if self.page_size == 0 {
            &self.order
        } else {
            let end = (self.page_offset + self.page_size).min(self.order.len());
            let start = self.page_offset.min(end);
            &self.order[start..end]
        };

        ids.iter().filter_map(|id| self.by_id.get(id).cloned()).collect()
    }

    pub fn page_left(&mut self) {
        self.page_offset = self.page_offset.saturating_sub(self.page_size);
    }

    pub fn page_right(&mut self) {
        if self.page_size == 0 {
            return;
        }
        let max_offset = self.order.len().saturating_sub(self.page_size);
        self.page_offset = (self.page_offset + self.page_size).min(max_offset);
    }

    fn clamp_offset(&mut self) {
        if self.page_size == 0 {
            return;
        }
        let max_offset = self.order.len().saturating_sub(self.page_size);
        self.page_offset = self.page_offset.min(max_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(n: usize, page: usize) -> StreamRegistry {
        let mut reg = StreamRegistry::new(page);
        for i in 0..n {
            reg.upsert(&format!("user-{}", i), MediaKind::Video);
        }
        reg
    }

    #[test]
    fn upsert_is_idempotent_per_participant() {
        let mut reg = StreamRegistry::new(3);
        assert!(reg.upsert("alice", MediaKind::Audio));
        assert!(!reg.upsert("alice", MediaKind::Video));
        assert_eq!(reg.len(), 1);

        let stream = &reg.visible()[0];
        assert!(stream.audio);
        assert!(stream.video);
    }

    #[test]
    fn visible_window_slices_in_insertion_order() {
        let reg = registry_with(5, 3);
        let ids: Vec<_> = reg.visible().iter().map(|s| s.participant_id.clone()).collect();
        assert_eq!(ids, vec!["user-0", "user-1", "user-2"]);
    }

    #[test]
    fn page_right_stops_at_last_full_window() {
        let mut reg = registry_with(5, 3);
        reg.page_right();
        let ids: Vec<_> = reg.visible().iter().map(|s| s.participant_id.clone()).collect();
        assert_eq!(ids, vec!["user-2", "user-3", "user-4"]);

        // Already at the end; another page must not move
        reg.page_right();
        assert_eq!(reg.visible().len(), 3);

        reg.page_left();
        let ids: Vec<_> = reg.visible().iter().map(|s| s.participant_id.clone()).collect();
        assert_eq!(ids, vec!["user-0", "user-1", "user-2"]);
    }

    #[test]
    fn removal_clamps_the_window() {
        let mut reg = registry_with(4, 3);
        reg.page_right();
        reg.remove("user-3");
        reg.remove("user-2");
        // Two streams left; window must slide back to show them
        assert_eq!(reg.visible().len(), 2);
    }

    #[test]
    fn zero_page_size_shows_everything() {
        let mut reg = registry_with(7, 0);
        assert_eq!(reg.visible().len(), 7);
        reg.page_right();
        assert_eq!(reg.visible().len(), 7);
    }
}
