// SPDX-License-Identifier: MIT

//! Intrusive zone lists.
//!
//! Zones in the same condition are linked together for efficient
//! processing. The links are 32-bit indices into the zone array and the
//! head/tail records live in the metadata header, so the lists persist
//! with the rest of the metadata. All operations are `MetaStore` methods;
//! a lone `Zone` cannot consistently update its neighbours.

use log::error;

use crate::meta::{ListId, MetaStore, LIST_NIL};
use crate::types::ZoneCond;

impl MetaStore {
    /// The list a zone of the given condition belongs to, if any.
    pub fn list_for_cond(cond: ZoneCond) -> Option<ListId> {
        match cond {
            ZoneCond::ImpOpen => Some(ListId::ImpOpen),
            ZoneCond::ExpOpen => Some(ListId::ExpOpen),
            ZoneCond::Closed => Some(ListId::Closed),
            ZoneCond::Empty | ZoneCond::Full => Some(ListId::SeqActive),
            _ => None,
        }
    }

    /// Index of the first zone in the list, if the list is non-empty.
    pub fn list_first(&self, id: ListId) -> Option<u32> {
        let head = self.list(id).head;
        if head == LIST_NIL {
            None
        } else {
            Some(head)
        }
    }

    /// Index of the next zone in the same list.
    pub fn list_next(&self, zone_idx: u32) -> Option<u32> {
        let next = self.zone(zone_idx).next;
        if next == LIST_NIL {
            None
        } else {
            Some(next)
        }
    }

    /// Snapshot of all zone indices in a list, head first. Used when the
    /// iteration body relinks zones.
    pub fn list_indices(&self, id: ListId) -> Vec<u32> {
        let mut out = Vec::with_capacity(self.list(id).size as usize);
        let mut cur = self.list_first(id);
        while let Some(idx) = cur {
            out.push(idx);
            cur = self.list_next(idx);
        }
        out
    }

    /// Add a zone at the head of a zone list.
    pub fn list_push_head(&mut self, id: ListId, zone_idx: u32) {
        let mut l = self.list(id);
        if l.size == 0 {
            l.head = zone_idx;
            l.tail = zone_idx;
            let z = self.zone_mut(zone_idx);
            z.next = LIST_NIL;
            z.prev = LIST_NIL;
        } else {
            let old_head = l.head;
            self.zone_mut(old_head).prev = zone_idx;
            let z = self.zone_mut(zone_idx);
            z.next = old_head;
            z.prev = LIST_NIL;
            l.head = zone_idx;
        }
        l.size += 1;
        self.set_list(id, l);
    }

    /// Add a zone at the tail of a zone list.
    pub fn list_push_tail(&mut self, id: ListId, zone_idx: u32) {
        let mut l = self.list(id);
        if l.size == 0 {
            l.head = zone_idx;
            l.tail = zone_idx;
            let z = self.zone_mut(zone_idx);
            z.next = LIST_NIL;
            z.prev = LIST_NIL;
        } else {
            let old_tail = l.tail;
            self.zone_mut(old_tail).next = zone_idx;
            let z = self.zone_mut(zone_idx);
            z.prev = old_tail;
            z.next = LIST_NIL;
            l.tail = zone_idx;
        }
        l.size += 1;
        self.set_list(id, l);
    }

    /// Remove a zone from a zone list. The zone must be linked in it.
    pub fn list_remove(&mut self, id: ListId, zone_idx: u32) {
        let mut l = self.list(id);
        let (prev, next) = {
            let z = self.zone(zone_idx);
            (z.prev, z.next)
        };

        l.size -= 1;
        if l.size == 0 {
            l.head = LIST_NIL;
            l.tail = LIST_NIL;
        } else if zone_idx == l.head {
            l.head = next;
            self.zone_mut(next).prev = LIST_NIL;
        } else if zone_idx == l.tail {
            l.tail = prev;
            self.zone_mut(prev).next = LIST_NIL;
        } else {
            self.zone_mut(next).prev = prev;
            self.zone_mut(prev).next = next;
        }
        self.set_list(id, l);

        let z = self.zone_mut(zone_idx);
        z.prev = 0;
        z.next = 0;
    }

    /// Remove a zone from its list based on its condition.
    /// No-op if the zone is not in a list.
    pub fn unlink_zone(&mut self, zone_idx: u32) {
        if self.zone(zone_idx).not_in_list() {
            return;
        }

        let cond = self.zone(zone_idx).condition();
        match cond.and_then(Self::list_for_cond) {
            Some(id) => self.list_remove(id, zone_idx),
            None => error!(
                "zone {} of wrong condition {:#x} in list",
                self.zone(zone_idx).start,
                self.zone(zone_idx).cond
            ),
        }
    }

    /// Check integrity of a zone list: bounds, link reciprocity, cycle
    /// bound and head/tail consistency. On failure returns the number of
    /// the check that tripped.
    pub fn check_list(&self, id: ListId) -> Result<(), u32> {
        let l = self.list(id);
        let nr_zones = self.nr_zones();

        if l.head != LIST_NIL && l.head >= nr_zones {
            return Err(1);
        }
        if l.tail != LIST_NIL && l.tail >= nr_zones {
            return Err(2);
        }

        let mut sz = 0u32;
        let mut prev: Option<u32> = None;
        let mut cur = self.list_first(id);
        while let Some(idx) = cur {
            let z = self.zone(idx);
            if z.not_in_list() {
                return Err(3);
            }
            if z.next != LIST_NIL && z.next >= nr_zones {
                return Err(4);
            }
            if z.prev != LIST_NIL && z.prev >= nr_zones {
                return Err(5);
            }
            match prev {
                Some(p) => {
                    if z.prev == LIST_NIL {
                        return Err(6);
                    }
                    if z.prev != p {
                        return Err(7);
                    }
                }
                None => {
                    if z.prev != LIST_NIL {
                        return Err(8);
                    }
                }
            }
            prev = Some(idx);
            sz += 1;
            if sz > nr_zones {
                return Err(9);
            }
            cur = self.list_next(idx);
        }

        if sz != l.size {
            return Err(10);
        }
        match (sz, prev) {
            (0, _) => {
                if l.head != LIST_NIL {
                    return Err(11);
                }
                if l.tail != LIST_NIL {
                    return Err(12);
                }
            }
            (1, Some(last)) => {
                if l.head != last {
                    return Err(13);
                }
                if l.tail != last {
                    return Err(14);
                }
            }
            (_, Some(last)) => {
                if l.head == last {
                    return Err(15);
                }
                if l.tail != last {
                    return Err(16);
                }
            }
            _ => unreachable!(),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::ZoneListHead;
    use crate::types::ZoneCond;

    fn store_with_zones(n: u32) -> MetaStore {
        let mut store = MetaStore::new(0, n);
        for id in [
            ListId::ImpOpen,
            ListId::ExpOpen,
            ListId::Closed,
            ListId::SeqActive,
        ] {
            store.set_list(id, ZoneListHead::EMPTY);
        }
        store
    }

    #[test]
    fn test_push_remove_middle_head_tail() {
        let mut s = store_with_zones(8);
        for idx in [3, 5, 7] {
            s.list_push_tail(ListId::Closed, idx);
        }
        assert_eq!(s.list_indices(ListId::Closed), vec![3, 5, 7]);
        s.check_list(ListId::Closed).unwrap();

        s.list_remove(ListId::Closed, 5);
        assert_eq!(s.list_indices(ListId::Closed), vec![3, 7]);
        assert!(s.zone(5).not_in_list());
        s.check_list(ListId::Closed).unwrap();

        s.list_remove(ListId::Closed, 3);
        assert_eq!(s.list_indices(ListId::Closed), vec![7]);
        s.check_list(ListId::Closed).unwrap();

        s.list_remove(ListId::Closed, 7);
        assert!(s.list(ListId::Closed).is_empty());
        assert_eq!(s.list(ListId::Closed).head, LIST_NIL);
        s.check_list(ListId::Closed).unwrap();
    }

    #[test]
    fn test_push_head_ordering() {
        let mut s = store_with_zones(4);
        s.list_push_head(ListId::ImpOpen, 1);
        s.list_push_head(ListId::ImpOpen, 2);
        s.list_push_tail(ListId::ImpOpen, 3);
        assert_eq!(s.list_indices(ListId::ImpOpen), vec![2, 1, 3]);
        s.check_list(ListId::ImpOpen).unwrap();
    }

    #[test]
    fn test_unlink_by_condition() {
        let mut s = store_with_zones(4);
        s.zone_mut(2).set_cond(ZoneCond::Closed);
        s.list_push_tail(ListId::Closed, 2);
        s.unlink_zone(2);
        assert!(s.list(ListId::Closed).is_empty());
        // A second unlink is a no-op.
        s.unlink_zone(2);
    }

    #[test]
    fn test_check_list_detects_broken_links() {
        let mut s = store_with_zones(4);
        s.list_push_tail(ListId::SeqActive, 0);
        s.list_push_tail(ListId::SeqActive, 1);
        s.zone_mut(1).prev = 3; // corrupt reciprocity
        assert_eq!(s.check_list(ListId::SeqActive), Err(7));

        let mut s = store_with_zones(4);
        s.list_push_tail(ListId::SeqActive, 0);
        let mut l = s.list(ListId::SeqActive);
        l.size = 2; // corrupt size
        s.set_list(ListId::SeqActive, l);
        assert_eq!(s.check_list(ListId::SeqActive), Err(10));
    }

    #[test]
    fn test_index_zero_membership_is_distinct_from_unlinked() {
        let mut s = store_with_zones(4);
        s.list_push_tail(ListId::Closed, 0);
        // Zone 0 is the single element: linked with NIL links.
        assert!(!s.zone(0).not_in_list());
        s.check_list(ListId::Closed).unwrap();
        s.list_remove(ListId::Closed, 0);
        assert!(s.zone(0).not_in_list());
    }
}
