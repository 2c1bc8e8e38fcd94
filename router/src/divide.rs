//! Resolve a batch of users into per-edge-server delivery lists.
//!
//! Users are first grouped by the routing node that owns them, then each
//! group is looked up with a single `MGet` and its sessions are regrouped by
//! edge server. The first failing node aborts the whole batch.

use crate::client::{Directory, Session};
use crate::error::Error;
use crate::ring::Ring;
use crate::subkey::SubKey;
use futures_util::future::join_all;
use log::*;
use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How the per-node lookups of one batch are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One node after another, stopping at the first failure.
    Sequential,
    /// All nodes at once; the failure of the earliest group is reported.
    #[default]
    Concurrent,
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(DispatchMode::Sequential),
            "concurrent" => Ok(DispatchMode::Concurrent),
            other => Err(format!("unknown dispatch mode {other}")),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DispatchMode::Sequential => write!(f, "sequential"),
            DispatchMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Edge server id to the subkeys of the sessions it holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryPlan(HashMap<i32, Vec<SubKey>>);

impl DeliveryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, session: &Session) {
        self.0.entry(session.server).or_default().push(session.subkey());
    }

    pub fn get(&self, server: i32) -> Option<&[SubKey]> {
        self.0.get(&server).map(Vec::as_slice)
    }

    pub fn iter(&self) -> hash_map::Iter<'_, i32, Vec<SubKey>> {
        self.0.iter()
    }

    /// Edge servers in ascending order.
    pub fn servers(&self) -> Vec<i32> {
        let mut servers: Vec<i32> = self.0.keys().copied().collect();
        servers.sort_unstable();
        servers
    }

    /// Number of edge servers in the plan.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn subkey_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl IntoIterator for DeliveryPlan {
    type Item = (i32, Vec<SubKey>);
    type IntoIter = hash_map::IntoIter<i32, Vec<SubKey>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Session> for DeliveryPlan {
    fn from_iter<I: IntoIterator<Item = Session>>(sessions: I) -> Self {
        let mut plan = DeliveryPlan::new();
        for session in sessions {
            plan.add(&session);
        }
        plan
    }
}

/// Group `user_ids` by owning node. Groups appear in the order their first
/// user does and keep the input order of their users.
pub fn shard(ring: &Ring, user_ids: &[i64]) -> Result<Vec<(String, Vec<i64>)>, Error> {
    let mut groups: Vec<(String, Vec<i64>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for &user_id in user_ids {
        let node = ring.lookup_user(user_id)?;
        let slot = *index.entry(node).or_insert_with(|| {
            groups.push((node.to_string(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(user_id);
    }
    Ok(groups)
}

impl Directory {
    /// Build the delivery plan for `user_ids`. Users without live sessions
    /// contribute nothing; a user with several sessions contributes one
    /// subkey per session. Any failing node fails the whole call and no
    /// plan is returned.
    pub async fn divide(&self, user_ids: &[i64]) -> Result<DeliveryPlan, Error> {
        let groups = shard(self.ring(), user_ids)?;

        let resolved = match self.mode {
            DispatchMode::Sequential => {
                let mut resolved = Vec::with_capacity(groups.len());
                for (node, users) in &groups {
                    resolved.push(self.batch_get(node, users).await?);
                }
                resolved
            }
            DispatchMode::Concurrent => {
                let lookups = groups
                    .iter()
                    .map(|(node, users)| self.batch_get(node, users));
                join_all(lookups)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        let plan: DeliveryPlan = resolved.into_iter().flatten().collect();
        debug!(
            "Divided {} users over {} routers into {} sessions on {} servers",
            user_ids.len(),
            groups.len(),
            plan.subkey_count(),
            plan.len()
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RouterErrorKind;
    use crate::subkey::encode;
    use crate::testing::{directory_with_mode, MemoryRouter};
    use rpc::ErrorKind as RpcErrorKind;
    use std::sync::Arc;
    use std::time::Duration;

    const MODES: [DispatchMode; 2] = [DispatchMode::Sequential, DispatchMode::Concurrent];

    fn owned_by(ring: &Ring, node: &str, skip: usize) -> i64 {
        (1..)
            .filter(|user_id| ring.lookup_user(*user_id).unwrap() == node)
            .nth(skip)
            .unwrap()
    }

    fn two_node_ring() -> Ring {
        Ring::build([("A", 1), ("B", 1)])
    }

    #[test]
    fn test_dispatch_mode_parses() {
        assert_eq!("sequential".parse::<DispatchMode>(), Ok(DispatchMode::Sequential));
        assert_eq!("Concurrent".parse::<DispatchMode>(), Ok(DispatchMode::Concurrent));
        assert!("parallel".parse::<DispatchMode>().is_err());
        assert_eq!(DispatchMode::default().to_string(), "concurrent");
    }

    #[test]
    fn test_shard_keeps_first_appearance_order() {
        let ring = two_node_ring();
        let a1 = owned_by(&ring, "A", 0);
        let a2 = owned_by(&ring, "A", 1);
        let b1 = owned_by(&ring, "B", 0);

        let groups = shard(&ring, &[b1, a2, a1, b1]).unwrap();

        assert_eq!(
            groups,
            vec![
                ("B".to_string(), vec![b1, b1]),
                ("A".to_string(), vec![a2, a1]),
            ]
        );
    }

    #[test]
    fn test_shard_on_empty_ring_fails() {
        let ring = Ring::build(Vec::<(String, u32)>::new());
        let err = shard(&ring, &[1]).unwrap_err();
        assert_eq!(err.error_kind, RouterErrorKind::RingEmpty);
        assert!(shard(&ring, &[]).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_divide_regroups_by_edge_server() {
        let ring = two_node_ring();
        let u1 = owned_by(&ring, "A", 0);
        let u2 = owned_by(&ring, "B", 0);
        let u3 = owned_by(&ring, "A", 1);

        for mode in MODES {
            let a = MemoryRouter::new();
            let b = MemoryRouter::new();
            a.insert(u1, 1, 5);
            a.insert(u3, 2, 5);
            b.insert(u2, 7, 9);
            let (directory, _) = directory_with_mode(&[("A", a), ("B", b)], mode).await;

            let plan = directory.divide(&[u1, u2, u3]).await.unwrap();

            assert_eq!(plan.servers(), vec![5, 9], "{mode}");
            assert_eq!(plan.get(5).unwrap(), &[encode(u1, 1), encode(u3, 2)]);
            assert_eq!(plan.get(9).unwrap(), &[encode(u2, 7)]);
            directory.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_divide_sends_one_batch_per_node() {
        let ring = two_node_ring();
        let users: Vec<i64> = (0..4)
            .map(|i| owned_by(&ring, "A", i))
            .chain((0..3).map(|i| owned_by(&ring, "B", i)))
            .collect();
        let a = MemoryRouter::new();
        let b = MemoryRouter::new();
        for user_id in &users {
            a.insert(*user_id, 1, 1);
            b.insert(*user_id, 1, 1);
        }
        let (directory, _) =
            directory_with_mode(&[("A", a.clone()), ("B", b.clone())], DispatchMode::Concurrent)
                .await;

        let plan = directory.divide(&users).await.unwrap();

        assert_eq!(a.mget_calls(), 1);
        assert_eq!(b.mget_calls(), 1);
        assert_eq!(plan.subkey_count(), users.len());
    }

    #[tokio::test]
    async fn test_divide_handles_missing_and_multi_device_users() {
        let node = MemoryRouter::new();
        node.insert(10, 1, 3);
        node.insert(10, 2, 4);
        node.insert(10, 3, 3);
        let (directory, _) = directory_with_mode(&[("A", node)], DispatchMode::Sequential).await;

        let plan = directory.divide(&[10, 11]).await.unwrap();

        assert_eq!(plan.get(3).unwrap(), &[encode(10, 1), encode(10, 3)]);
        assert_eq!(plan.get(4).unwrap(), &[encode(10, 2)]);
        assert_eq!(plan.subkey_count(), 3);
    }

    #[tokio::test]
    async fn test_divide_of_nobody_is_empty() {
        let node = MemoryRouter::new();
        let (directory, _) = directory_with_mode(&[("A", node)], DispatchMode::Concurrent).await;

        assert!(directory.divide(&[]).await.unwrap().is_empty());
        assert!(directory.divide(&[1, 2, 3]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_divide_fails_fast_naming_the_node() {
        let ring = two_node_ring();
        let u1 = owned_by(&ring, "A", 0);
        let u2 = owned_by(&ring, "B", 0);

        for mode in MODES {
            let a = MemoryRouter::new();
            let b = MemoryRouter::new();
            a.insert(u1, 1, 5);
            b.insert(u2, 1, 9);
            b.set_failing(true);
            let (directory, _) = directory_with_mode(&[("A", a), ("B", b)], mode).await;

            let err = directory.divide(&[u1, u2]).await.unwrap_err();

            assert_eq!(err.node(), Some("B"), "{mode}");
            assert!(matches!(
                err.error_kind,
                RouterErrorKind::Rpc { kind: RpcErrorKind::Remote(_), .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_divide_reports_earliest_group_regardless_of_timing() {
        let ring = two_node_ring();
        let u1 = owned_by(&ring, "A", 0);
        let u2 = owned_by(&ring, "B", 0);

        for mode in MODES {
            let a = MemoryRouter::new();
            let b = MemoryRouter::new();
            a.set_failing(true);
            a.set_delay(Duration::from_millis(100));
            b.set_failing(true);
            let (directory, _) = directory_with_mode(&[("A", a), ("B", b)], mode).await;

            let err = directory.divide(&[u1, u2]).await.unwrap_err();
            assert_eq!(err.node(), Some("A"), "{mode}");

            let err = directory.divide(&[u2, u1]).await.unwrap_err();
            assert_eq!(err.node(), Some("B"), "{mode}");
            directory.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_divide_with_unreachable_node_reports_unavailable() {
        let ring = two_node_ring();
        let u1 = owned_by(&ring, "A", 0);
        let u2 = owned_by(&ring, "B", 0);
        let a = MemoryRouter::new();
        let b = MemoryRouter::new();
        let (directory, connector) =
            directory_with_mode(&[("A", a), ("B", b)], DispatchMode::Concurrent).await;
        connector.fail_next("router-b", usize::MAX);
        assert!(connector.kill("router-b"));

        let err = directory.divide(&[u1, u2]).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            RouterErrorKind::Rpc {
                node: "B".to_string(),
                kind: RpcErrorKind::Unavailable
            }
        );
        assert!(directory.divide(&[u1]).await.is_ok());
    }

    #[tokio::test]
    async fn test_plan_partitions_returned_sessions() {
        let nodes = [("A", MemoryRouter::new()), ("B", MemoryRouter::new())];
        let ring = two_node_ring();
        let mut expected = Vec::new();
        for user_id in 0..60i64 {
            let owner = ring.lookup_user(user_id).unwrap();
            let (_, router) = nodes.iter().find(|(name, _)| *name == owner).unwrap();
            for seq in 0..(user_id % 3) as i32 {
                let server = (user_id as i32 + seq) % 4;
                router.insert(user_id, seq, server);
                expected.push(Session { user_id, seq, server });
            }
        }
        let routers: Vec<(&str, Arc<MemoryRouter>)> =
            nodes.iter().map(|(name, router)| (*name, router.clone())).collect();
        let (directory, _) = directory_with_mode(&routers, DispatchMode::Concurrent).await;

        let users: Vec<i64> = (0..60).collect();
        let plan = directory.divide(&users).await.unwrap();

        let mut seen: Vec<(i32, SubKey)> = plan
            .into_iter()
            .flat_map(|(server, subkeys)| subkeys.into_iter().map(move |key| (server, key)))
            .collect();
        seen.sort();
        let mut wanted: Vec<(i32, SubKey)> = expected
            .iter()
            .map(|session| (session.server, session.subkey()))
            .collect();
        wanted.sort();
        assert_eq!(seen, wanted);
    }
}
