use itertools::Itertools;
use keel::prelude::*;

#[test]
fn array_size_capacity_invariant_over_mixed_ops() {
    let mut array: Array<i32> = Array::new();
    for i in 0..200 {
        array.push_back(i);
        assert!(array.len() <= array.capacity());
    }
    for _ in 0..100 {
        array.pop_front();
        assert!(array.len() <= array.capacity());
    }
    array.shrink_to_fit();
    assert_eq!(array.len(), array.capacity());
}

#[test]
fn array_insert_remove_duality() {
    let reference: Array<i32> = (0..10).collect();

    let mut array = reference.clone();
    array.push_back(99);
    array.pop_back();
    assert_eq!(reference, array);

    array.push_front(99);
    array.pop_front();
    assert_eq!(reference, array);

    array.insert(4, 99).unwrap();
    array.remove_at(4).unwrap();
    assert_eq!(reference, array);
}

#[test]
fn slist_back_is_reachable_after_every_operation() {
    let mut list: SList<i32> = SList::new();
    assert_eq!(None, list.back());

    list.push_back(1);
    list.push_front(0);
    list.push_back(2);
    assert_eq!(Some(&2), list.back());
    assert_eq!(vec![0, 1, 2], list.iter().copied().collect::<Vec<_>>());

    list.pop_back();
    assert_eq!(Some(&1), list.back());

    list.reverse();
    assert_eq!(Some(&0), list.back());

    list.sort();
    assert_eq!(Some(&1), list.back());

    list.pop_back();
    list.pop_back();
    assert_eq!(None, list.back());
    assert!(list.is_empty());
}

#[test]
fn slist_merge_sort_and_splice() {
    let mut left: SList<i32> = [5, 1, 3].iter().copied().collect();
    let mut right: SList<i32> = [4, 2, 6].iter().copied().collect();
    left.sort();
    right.sort();
    left.merge(&mut right);

    assert!(right.is_empty());
    assert_eq!(
        (1..=6).collect::<Vec<_>>(),
        left.iter().copied().collect::<Vec<_>>()
    );
}

#[test]
fn hashmap_grows_to_least_prime_for_ten_keys() {
    let mut map: HashMap<String, i32> = HashMap::new();
    for i in 0..10 {
        map.insert(format!("key{}", i), i);
    }
    assert_eq!(11, map.bucket_count());
    for i in 0..10 {
        assert_eq!(Some(&i), map.get(format!("key{}", i).as_str()));
    }
}

#[test]
fn hashmap_keys_resolve_after_rehash() {
    let mut map: HashMap<i32, i32> = (0..100).map(|i| (i, i * i)).collect();
    let before = map.len();
    map.resize(997);
    assert_eq!(before, map.len());
    for i in 0..100 {
        assert_eq!(Some(&(i * i)), map.get(&i));
    }
}

#[test]
fn hashmap_equality_ignores_insertion_order_and_buckets() {
    let pairs: Vec<(String, i32)> = (0..20).map(|i| (format!("k{}", i), i)).collect();

    let forward: HashMap<String, i32> = pairs.iter().cloned().collect();
    let mut backward: HashMap<String, i32> = pairs.iter().cloned().rev().collect();
    backward.resize(113);

    assert_eq!(forward, backward);
}

#[test]
fn variant_array_type_stickiness() {
    let mut variant = VariantArray::new();
    variant.push_back(1i32).unwrap();
    variant.push_back(2i32).unwrap();

    assert!(matches!(
        variant.push_back(1.5f32),
        Err(Error::InvalidType { .. })
    ));
    assert!(matches!(
        variant.push_back(true),
        Err(Error::InvalidType { .. })
    ));

    variant.pop_back();
    variant.pop_back();
    assert!(variant.is_empty());
    // a new alternative may be chosen once empty
    variant.push_back("fresh".to_string()).unwrap();
    assert_eq!(DatumType::String, variant.datum_type());
}

#[test]
fn datum_type_switch_rejected_and_contents_kept() {
    let mut datum = Datum::new();
    datum.push_back(1i32).unwrap();

    assert!(matches!(
        datum.push_back(false),
        Err(Error::InvalidType { .. })
    ));
    assert_eq!(1, datum.len());
    assert_eq!(Ok(&1), datum.get::<i32>(0));
}

#[test]
fn datum_external_round_trip() {
    let mut backing = [1i32, 2, 3, 4];
    let mut datum = unsafe { Datum::from_raw_parts(backing.as_mut_ptr(), 4, 4) };

    for i in 0..4 {
        assert!(datum.value(i).unwrap() == backing[i]);
    }

    // growth operations must refuse to touch the caller's buffer
    assert!(matches!(
        datum.push_back(5i32),
        Err(Error::ExternalStorage(_))
    ));
    assert!(matches!(datum.reserve(16), Err(Error::ExternalStorage(_))));

    // mutation through the view is observable in the backing array
    datum.set(1, 20i32).unwrap();
    drop(datum);
    assert_eq!([1, 20, 3, 4], backing);
}

#[test]
fn datum_value_wrapper_cross_type_comparisons() {
    let ints: Datum = vec![1i32, 0].into_iter().collect();
    assert!(ints.value(0).unwrap() == true);
    assert!(ints.value(0).unwrap() == 1.0f32);
    assert!(ints.value(1).unwrap() == false);

    let names: Datum = vec!["alpha".to_string()].into_iter().collect();
    assert!(names.value(0).unwrap() == "alpha".to_string());
    assert!(names.value(0).unwrap() != 1i32);
}

#[test]
fn stack_and_queue_adapters() {
    let mut stack: Stack<i32> = Stack::new();
    let mut queue: Queue<i32> = Queue::new();
    for i in 0..5 {
        stack.push(i);
        queue.enqueue(i);
    }

    let popped = std::iter::from_fn(|| stack.pop()).collect::<Vec<_>>();
    let dequeued = std::iter::from_fn(|| queue.dequeue()).collect::<Vec<_>>();

    assert_eq!(vec![4, 3, 2, 1, 0], popped);
    assert_eq!(vec![0, 1, 2, 3, 4], dequeued);
}

#[test]
fn hashmap_invert_and_merge_round_trip() {
    let map: HashMap<String, i32> = (0..8).map(|i| (format!("k{}", i), i)).collect();
    let inverted = map.clone().invert();
    assert_eq!(8, inverted.len());
    for i in 0..8 {
        assert_eq!(Some(&format!("k{}", i)), inverted.get(&i));
    }

    let mut target: HashMap<String, i32> = [("a", 1), ("b", 2)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    let mut donor: HashMap<String, i32> = [("b", 20), ("c", 3)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
    target.merge(&mut donor);

    let keys = target.keys().map(String::as_str).sorted().join(",");
    assert_eq!("a,b,c", keys);
    assert_eq!(Some(&2), target.get("b"));
    assert_eq!(Some(&20), donor.get("b"));
}
