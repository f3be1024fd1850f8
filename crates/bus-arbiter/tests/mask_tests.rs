use bus_arbiter::{SlotId, SlotMask, MAX_SLOTS};

fn slot(index: usize) -> SlotId {
    SlotId::new(index).unwrap()
}

#[test]
fn slot_ids_stop_at_mask_width() {
    assert_eq!(MAX_SLOTS, 32);
    assert_eq!(slot(31).mask(), SlotMask::from_bits(1 << 31));
    assert_eq!(SlotId::new(32), None);
}

#[test]
fn first_covers_partial_and_full_widths() {
    assert_eq!(SlotMask::first(0), SlotMask::EMPTY);
    assert_eq!(SlotMask::first(3), SlotMask::from_bits(0b111));
    assert_eq!(SlotMask::first(32), SlotMask::FULL);
    assert_eq!(SlotMask::first(40), SlotMask::FULL);
}

#[test]
fn highest_picks_top_bit() {
    assert_eq!(SlotMask::EMPTY.highest(), None);
    assert_eq!(SlotMask::from_bits(0b0101).highest(), Some(slot(2)));
    assert_eq!(SlotMask::FULL.highest(), Some(slot(31)));
    assert_eq!(SlotMask::from_bits(1).highest(), Some(slot(0)));
}

#[test]
fn iteration_follows_service_order() {
    let mask = SlotMask::from_bits(0b1001_0110);
    let order: Vec<usize> = mask.iter().map(SlotId::index).collect();

    assert_eq!(order, [7, 4, 2, 1]);
    assert_eq!(mask.iter().len(), 4);
    assert_eq!(mask.iter().collect::<SlotMask>(), mask);
}

#[test]
fn set_algebra() {
    let a = SlotMask::from_bits(0b1100);
    let b = SlotMask::from_bits(0b0110);

    assert_eq!(a.union(b), SlotMask::from_bits(0b1110));
    assert_eq!(a.intersection(b), SlotMask::from_bits(0b0100));
    assert_eq!(a.difference(b), SlotMask::from_bits(0b1000));
    assert!(!a.is_disjoint(b));
    assert!(SlotMask::from_bits(0b0100).is_subset(a));
    assert!(SlotMask::EMPTY.is_subset(SlotMask::EMPTY));
    assert!(a.contains(slot(3)) && !a.contains(slot(0)));
    assert_eq!(a.len(), 2);
}
