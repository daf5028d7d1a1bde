//! Basic usage examples for celltrie.

use celltrie::TrieMap;

fn main() {
    example_string_keys();
    example_numeric_keys();
    example_bounds_and_ranges();
}

fn example_string_keys() {
    println!("=== String keys ===\n");

    let mut map: TrieMap<String, u64> = TrieMap::new();
    map.insert("user:1001".to_string(), 1001);
    map.insert("user:1002".to_string(), 1002);
    map.insert("post:2001".to_string(), 2001);

    println!("user:1001 = {:?}", map.get(&"user:1001".to_string()));
    println!("user:9999 = {:?}", map.get(&"user:9999".to_string()));
    println!("len = {}", map.len());

    // Iteration is always in sorted key order.
    for (k, v) in map.iter() {
        println!("  {k} -> {v}");
    }
    println!();
}

fn example_numeric_keys() {
    println!("=== Numeric keys ===\n");

    let mut map: TrieMap<i32, &str> = TrieMap::new();
    map.insert(0, "zero");
    map.insert(-5, "minus five");
    map.insert(i32::MIN, "smallest");
    map.insert(i32::MAX, "largest");

    // Signed keys iterate in numeric order.
    for (k, v) in map.iter() {
        println!("  {k} -> {v}");
    }
    println!();
}

fn example_bounds_and_ranges() {
    println!("=== Bounds and ranges ===\n");

    let map: TrieMap<u64, u64> = (0..100u64).map(|k| (k * 10, k)).collect();

    println!("lower_bound(42) = {:?}", map.lower_bound(&42));
    println!("upper_bound(40) = {:?}", map.upper_bound(&40));
    println!("prev(42, incl)  = {:?}", map.prev(&42, true));

    let window: Vec<u64> = map.range(200..250).map(|(k, _)| k).collect();
    println!("range 200..250  = {window:?}");
}
