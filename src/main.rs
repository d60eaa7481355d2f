use std::sync::Arc;

use keel::buffer::BufferPoolManager;
use keel::common::{PageId, RecordId, SlotId};
use keel::index::BPlusTree;
use keel::storage::disk::DiskManager;

fn main() {
    env_logger::init();

    println!("Keel - disk-oriented storage kernel");
    println!("===================================\n");

    let db_path = "demo.db";
    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open database file"));
    println!("Opened database file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager));
    println!("Buffer pool: 16 frames, LRU-2 replacement\n");

    let tree = BPlusTree::new("demo_index", Arc::clone(&bpm), 4, 4);

    for key in [17, 3, 25, 8, 1, 12, 30, 21, 5, 9] {
        let rid = RecordId::new(PageId::new(100 + key), SlotId::new(0));
        tree.insert(key, rid).expect("insert failed");
    }
    println!("Inserted 10 keys; root page is {}", tree.root_page_id());

    match tree.get_value(12).expect("lookup failed") {
        Some(rid) => println!("get_value(12) -> {}", rid),
        None => println!("get_value(12) -> not found"),
    }

    print!("In-order scan:");
    for entry in tree.iter().expect("iterator failed") {
        let (key, _) = entry.expect("scan failed");
        print!(" {}", key);
    }
    println!();

    tree.remove(8).expect("remove failed");
    tree.remove(25).expect("remove failed");
    println!("Removed keys 8 and 25");

    print!("In-order scan:");
    for entry in tree.iter().expect("iterator failed") {
        let (key, _) = entry.expect("scan failed");
        print!(" {}", key);
    }
    println!();

    tree.draw("demo_tree.dot").expect("draw failed");
    println!("\nWrote GraphViz dump to demo_tree.dot");

    bpm.flush_all_pages().expect("flush failed");

    std::fs::remove_file(db_path).ok();
    std::fs::remove_file("demo_tree.dot").ok();
    println!("Demo completed");
}
