//! Observations held by the client
//!
//! An observation is created by a GET carrying Observe=0 and is identified
//! by the requesting server's address and the observed path. Notifications
//! reuse the token of the GET that created it.

use lwm2m_core::Lwm2mPath;
use lwm2m_transport::Token;
use std::net::SocketAddr;

/// Observe option values are 24 bits wide
const OBSERVE_SEQ_MASK: u32 = 0x00FF_FFFF;

/// One server's observation of a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub peer: SocketAddr,
    pub path: Lwm2mPath,
    pub token: Token,
    seq: u32,
}

impl Observation {
    pub fn new(peer: SocketAddr, path: Lwm2mPath, token: Token) -> Self {
        Self { peer, path, token, seq: 0 }
    }

    /// Observe sequence number of the last message sent
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// Advance and return the sequence number for the next notification
    pub fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1) & OBSERVE_SEQ_MASK;
        self.seq
    }
}

/// The client's active observations
#[derive(Debug, Default)]
pub struct ObservationSet {
    observations: Vec<Observation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing, replacing an observation of the same path by the
    /// same server
    pub fn add(&mut self, peer: SocketAddr, path: Lwm2mPath, token: Token) {
        self.remove(peer, &path);
        self.observations.push(Observation::new(peer, path, token));
    }

    /// Cancel one server's observation of a path
    ///
    /// # Returns
    /// `true` if an observation was removed
    pub fn remove(&mut self, peer: SocketAddr, path: &Lwm2mPath) -> bool {
        let before = self.observations.len();
        self.observations.retain(|o| !(o.peer == peer && o.path == *path));
        self.observations.len() != before
    }

    /// Cancel every observation at or below `path`
    ///
    /// # Returns
    /// The cancelled observations
    pub fn remove_under(&mut self, path: &Lwm2mPath) -> Vec<Observation> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .observations
            .drain(..)
            .partition(|o| path.contains(&o.path));
        self.observations = kept;
        removed
    }

    /// Indices of the observations touched by `paths`
    ///
    /// An observation matches a path equal to, above or below its own. Each
    /// index appears once, ordered by the first path it matches.
    pub fn matching(&self, paths: &[Lwm2mPath]) -> Vec<usize> {
        let mut indices = Vec::new();
        for path in paths {
            for (index, observation) in self.observations.iter().enumerate() {
                if observation.path.is_related(path) && !indices.contains(&index) {
                    indices.push(index);
                }
            }
        }
        indices
    }

    pub fn get(&self, index: usize) -> Option<&Observation> {
        self.observations.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Observation> {
        self.observations.get_mut(index)
    }

    /// Remove the observations at the given indices
    pub fn remove_indices(&mut self, indices: &[usize]) {
        let mut index = 0;
        self.observations.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn clear(&mut self) {
        self.observations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_add_replaces_same_server_and_path() {
        let mut set = ObservationSet::new();
        set.add(peer(1), Lwm2mPath::resource(3, 0, 0), 7);
        set.add(peer(1), Lwm2mPath::resource(3, 0, 0), 8);
        set.add(peer(2), Lwm2mPath::resource(3, 0, 0), 9);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).unwrap().token, 8);
    }

    #[test]
    fn test_matching_related_paths_once() {
        let mut set = ObservationSet::new();
        set.add(peer(1), Lwm2mPath::object(3), 1);
        set.add(peer(1), Lwm2mPath::resource(3, 0, 0), 2);
        set.add(peer(1), Lwm2mPath::resource(3, 0, 1), 3);
        set.add(peer(1), Lwm2mPath::resource(1, 0, 1), 4);

        let paths = [Lwm2mPath::resource(3, 0, 1), Lwm2mPath::instance(3, 0)];
        assert_eq!(set.matching(&paths), vec![0, 2, 1]);
        assert!(set.matching(&[Lwm2mPath::object(5)]).is_empty());
    }

    #[test]
    fn test_remove_under_instance() {
        let mut set = ObservationSet::new();
        set.add(peer(1), Lwm2mPath::object(3), 1);
        set.add(peer(1), Lwm2mPath::instance(3, 0), 2);
        set.add(peer(1), Lwm2mPath::resource(3, 0, 1), 3);
        set.add(peer(1), Lwm2mPath::instance(3, 1), 4);

        let removed = set.remove_under(&Lwm2mPath::instance(3, 0));
        assert_eq!(removed.len(), 2);
        let tokens: Vec<Token> = set.iter().map(|o| o.token).collect();
        assert_eq!(tokens, vec![1, 4]);
    }

    #[test]
    fn test_sequence_wraps_at_24_bits() {
        let mut observation = Observation::new(peer(1), Lwm2mPath::object(3), 1);
        assert_eq!(observation.next_seq(), 1);
        observation.seq = OBSERVE_SEQ_MASK;
        assert_eq!(observation.next_seq(), 0);
    }

    #[test]
    fn test_remove_indices() {
        let mut set = ObservationSet::new();
        for port in 1..=4 {
            set.add(peer(port), Lwm2mPath::object(3), u64::from(port));
        }
        set.remove_indices(&[0, 2]);
        let tokens: Vec<Token> = set.iter().map(|o| o.token).collect();
        assert_eq!(tokens, vec![2, 4]);
    }
}
