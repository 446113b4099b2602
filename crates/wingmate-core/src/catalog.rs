//! Generic membership catalog (§4.2).
//!
//! Implemented as an arena plus stable indices: members live in a fixed
//! slot table, and the uuid map holds indices into that table rather than
//! a second owning reference, avoiding the cyclic slot-array/uuid-map
//! back-reference problem called out in the design notes.

use std::collections::HashMap;

use crate::CoreError;

/// Maximum simultaneous live members in a session.
pub const MAX_IN_SESSION: usize = 16;

/// Number of broadcast ticks an expired member survives before being
/// purged entirely (it must be announced as departed a bounded number of
/// times before being forgotten, since UDP is lossy).
pub const REAP_THRESHOLD: u32 = 4;

/// Common fields every catalog member (`SessionMember`, `TrackedAircraft`)
/// must expose, so `MembershipCatalog` can be written once and
/// instantiated for both roles.
pub trait Member {
    /// This member's session uuid.
    fn uuid(&self) -> u32;

    /// The slot this member currently occupies, once admitted.
    fn slot_id(&self) -> Option<u8>;

    /// Record the slot assigned by the catalog on admission.
    fn set_slot_id(&mut self, slot: u8);

    /// Ticks since this member was last heard from.
    fn stale_counter(&self) -> u32;

    /// Reset the stale counter (called whenever a fresh report arrives).
    fn reset_stale_counter(&mut self);

    /// Increment and return the new stale counter value.
    fn increment_stale_counter(&mut self) -> u32;

    /// Ticks since this member was moved to the expired list.
    fn reap_counter(&self) -> u32;

    /// Increment and return the new reap counter value.
    fn increment_reap_counter(&mut self) -> u32;
}

/// A polymorphic-over-member-type slot table plus uuid index plus expired
/// list, per §4.2.
pub struct MembershipCatalog<M: Member> {
    slots: Vec<Option<M>>,
    by_uuid: HashMap<u32, u8>,
    expired: Vec<M>,
}

impl<M: Member> Default for MembershipCatalog<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Member> MembershipCatalog<M> {
    /// Create an empty catalog with `MAX_IN_SESSION` slots.
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_IN_SESSION);
        slots.resize_with(MAX_IN_SESSION, || None);
        Self { slots, by_uuid: HashMap::new(), expired: Vec::new() }
    }

    /// Number of live members.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.by_uuid.len()
    }

    /// Find a live member by uuid.
    pub fn find(&self, uuid: u32) -> Option<&M> {
        let slot = *self.by_uuid.get(&uuid)?;
        self.slots[slot as usize].as_ref()
    }

    /// Find a live member by uuid, mutably.
    pub fn find_mut(&mut self, uuid: u32) -> Option<&mut M> {
        let slot = *self.by_uuid.get(&uuid)?;
        self.slots[slot as usize].as_mut()
    }

    /// Find a live member occupying slot `i`.
    #[must_use]
    pub fn find_by_slot(&self, i: u8) -> Option<&M> {
        self.slots.get(i as usize)?.as_ref()
    }

    /// Iterate over all live members.
    pub fn iter(&self) -> impl Iterator<Item = &M> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Iterate over all live members, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut M> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// Admit `member` under `uuid`, assigning the lowest-index free slot.
    ///
    /// # Errors
    ///
    /// `CoreError::Full` if no slot is free.
    pub fn add(&mut self, uuid: u32, mut member: M) -> Result<u8, CoreError> {
        let slot = self.slots.iter().position(Option::is_none).ok_or(CoreError::Full)?;
        member.set_slot_id(slot as u8);
        self.by_uuid.insert(uuid, slot as u8);
        self.slots[slot] = Some(member);
        Ok(slot as u8)
    }

    /// Remove a live member by uuid, promoting it to the expired list.
    /// No-op if the uuid is not currently live.
    pub fn remove(&mut self, uuid: u32) {
        let Some(slot) = self.by_uuid.remove(&uuid) else {
            return;
        };
        if let Some(mut member) = self.slots[slot as usize].take() {
            member.reset_stale_counter();
            self.expired.push(member);
        }
    }

    /// Scan live members once; expire the first whose stale counter
    /// exceeds `limit`. At most one member is expired per call.
    pub fn check_lapsed(&mut self, limit: u32) {
        let expired_uuid = self.iter().find(|m| m.stale_counter() > limit).map(Member::uuid);
        if let Some(uuid) = expired_uuid {
            self.remove(uuid);
        }
    }

    /// Scan the expired list once; permanently erase the first entry whose
    /// reap counter exceeds [`REAP_THRESHOLD`]. At most one entry is
    /// erased per call.
    pub fn reap_expired(&mut self) {
        if let Some(index) = self.expired.iter().position(|m| m.reap_counter() > REAP_THRESHOLD) {
            self.expired.remove(index);
        }
    }

    /// Uuids currently on the expired list, each call incrementing that
    /// member's reap counter (consumed by the hub's WORLDSTATE builder).
    pub fn expired_uuids_for_broadcast(&mut self) -> Vec<u32> {
        self.expired.iter_mut().map(|m| (m.uuid(), m.increment_reap_counter())).map(|(uuid, _)| uuid).collect()
    }
}
