use dashmap::DashMap;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, info};

use super::messages::{Member, MemberId};

/// Target selection, owned outside the detector.
pub trait Membership: Send + Sync + 'static {
    /// Next member to probe directly, if any.
    fn next(&self) -> Option<Member>;

    /// Up to `k` distinct members to act as relays.
    fn random(&self, k: usize) -> Vec<Member>;

    /// Relays for an indirect probe of `target`. Defaults to `random(k)`, which may
    /// include the target itself; implementations that can exclude it should.
    fn relays(&self, k: usize, target: &Member) -> Vec<Member> {
        let _ = target;
        self.random(k)
    }
}

/// Known peers. Probe targets are visited round-robin in a shuffled order that is
/// rebuilt after every full pass.
pub struct MemberList {
    local_id: MemberId,
    members: DashMap<MemberId, Member>,
    probe_order: Mutex<VecDeque<MemberId>>,
}

impl MemberList {
    pub fn new(local_id: MemberId) -> Self {
        Self {
            local_id,
            members: DashMap::new(),
            probe_order: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_members(local_id: MemberId, members: Vec<Member>) -> Self {
        let list = Self::new(local_id);
        for member in members {
            list.upsert_member(member);
        }
        list
    }

    pub fn upsert_member(&self, member: Member) {
        if member.id == self.local_id {
            return;
        }

        let member_id = member.id.clone();
        if let Some(mut existing) = self.members.get_mut(&member_id) {
            if existing.addr != member.addr {
                debug!(
                    "Member {} moved from {} to {}",
                    member_id, existing.addr, member.addr
                );
                *existing = member;
            }
        } else {
            info!("Discovered new member: {} at {}", member_id, member.addr);
            self.members.insert(member_id, member);
        }
    }

    pub fn get_all_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn reshuffle(&self, order: &mut VecDeque<MemberId>) {
        let mut ids: Vec<MemberId> = self.members.iter().map(|entry| entry.key().clone()).collect();
        ids.shuffle(&mut rand::rng());
        order.extend(ids);
    }
}

impl Membership for MemberList {
    fn next(&self) -> Option<Member> {
        let mut order = self.probe_order.lock().unwrap_or_else(|e| e.into_inner());

        if order.is_empty() {
            self.reshuffle(&mut order);
        }
        let id = order.pop_front()?;
        self.members.get(&id).map(|member| member.value().clone())
    }

    fn random(&self, k: usize) -> Vec<Member> {
        let members = self.get_all_members();
        members
            .choose_multiple(&mut rand::rng(), k)
            .cloned()
            .collect()
    }

    fn relays(&self, k: usize, target: &Member) -> Vec<Member> {
        let candidates: Vec<Member> = self
            .get_all_members()
            .into_iter()
            .filter(|member| member.id != target.id)
            .collect();
        candidates
            .choose_multiple(&mut rand::rng(), k)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::net::SocketAddr;

    fn member(name: &str, port: u16) -> Member {
        Member::new(
            MemberId::new(name.to_string()),
            SocketAddr::from(([127, 0, 0, 1], port)),
        )
    }

    fn list_of(n: u16) -> MemberList {
        let members = (0..n).map(|i| member(&format!("m{}", i), 7300 + i)).collect();
        MemberList::with_members(MemberId::new("local".to_string()), members)
    }

    #[test]
    fn test_next_on_empty_list_is_none() {
        let list = MemberList::new(MemberId::new("local".to_string()));
        assert!(list.next().is_none());
        assert!(list.random(3).is_empty());
    }

    #[test]
    fn test_local_member_is_never_added() {
        let list = MemberList::new(MemberId::new("local".to_string()));
        list.upsert_member(member("local", 7000));
        assert!(list.is_empty());
    }

    #[test]
    fn test_next_visits_every_member_once_per_pass() {
        let list = list_of(5);

        let first_pass: HashSet<MemberId> = (0..5).map(|_| list.next().unwrap().id).collect();
        let second_pass: HashSet<MemberId> = (0..5).map(|_| list.next().unwrap().id).collect();

        assert_eq!(first_pass.len(), 5);
        assert_eq!(second_pass, first_pass);
    }

    #[test]
    fn test_random_returns_distinct_members_up_to_k() {
        let list = list_of(5);

        let picked = list.random(3);
        let distinct: HashSet<_> = picked.iter().map(|m| m.id.clone()).collect();
        assert_eq!(picked.len(), 3);
        assert_eq!(distinct.len(), 3);

        assert_eq!(list.random(10).len(), 5);
        assert_eq!(list_of(1).random(3).len(), 1);
    }

    #[test]
    fn test_relays_never_include_the_target() {
        let list = list_of(4);
        let target = member("m2", 7302);

        for _ in 0..20 {
            let relays = list.relays(3, &target);
            assert_eq!(relays.len(), 3);
            assert!(relays.iter().all(|m| m.id != target.id));
        }
        assert!(list_of(1).relays(3, &member("m0", 7300)).is_empty());
    }
}
