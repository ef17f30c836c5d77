//! Inbound media stream

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;

use crate::events::RemoteTrackInfo;

/// Tracks received from the peer
///
/// Grows monotonically; clones share the same contents. Subscribers of
/// [`RemoteStream::watch`] see the track count change.
#[derive(Clone)]
pub struct RemoteStream {
    tracks: Arc<RwLock<Vec<RemoteTrackInfo>>>,
    count: Arc<watch::Sender<usize>>,
}

impl RemoteStream {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            tracks: Arc::new(RwLock::new(Vec::new())),
            count: Arc::new(count),
        }
    }

    /// Add a track; returns `false` if it was already present
    pub(crate) fn push(&self, track: RemoteTrackInfo) -> bool {
        let len = {
            let mut tracks = self.tracks.write();
            if tracks.iter().any(|t| t.id == track.id) {
                return false;
            }
            tracks.push(track);
            tracks.len()
        };
        self.count.send_replace(len);
        true
    }

    pub fn tracks(&self) -> Vec<RemoteTrackInfo> {
        self.tracks.read().clone()
    }

    pub fn len(&self) -> usize {
        self.tracks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.read().is_empty()
    }

    pub fn watch(&self) -> watch::Receiver<usize> {
        self.count.subscribe()
    }
}

impl Default for RemoteStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream")
            .field("tracks", &*self.tracks.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;

    fn track(id: &str) -> RemoteTrackInfo {
        RemoteTrackInfo {
            id: id.to_string(),
            kind: MediaKind::Video,
            stream_id: "remote".to_string(),
        }
    }

    #[test]
    fn test_grows_monotonically() {
        let stream = RemoteStream::new();
        let rx = stream.watch();

        assert!(stream.push(track("v1")));
        assert!(!stream.push(track("v1")));
        assert!(stream.push(track("a1")));

        assert_eq!(stream.len(), 2);
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(stream.clone().tracks()[0].id, "v1");
    }
}
