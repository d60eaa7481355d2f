//! Keel - the storage kernel of a disk-oriented relational database.
//!
//! The crate covers the three subsystems where the memory hierarchy and the
//! concurrency discipline actually live:
//!
//! - **Buffer pool** (`buffer`): a fixed set of frames multiplexed over the
//!   disk-resident page space, with pin/latch page guards and LRU-K
//!   eviction. The page-table mapping is an extendible hash table
//!   (`container`).
//! - **B+Tree index** (`index`): a concurrent ordered map from keys to
//!   record ids built on borrowed buffer-pool pages, traversed with latch
//!   crabbing, plus a leaf-chain iterator.
//! - **Page layouts** (`storage::page`): the byte-level leaf, internal, and
//!   header page formats reinterpreted in place over 4 KiB slabs.
//!
//! Disk I/O (`storage::disk`) and the execution engine (`execution`) take
//! part only as boundary collaborators: a flat page file behind a scheduler
//! thread, and a pull-based executor pipeline whose sequential scan speaks
//! the lock-manager handshake.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keel::buffer::BufferPoolManager;
//! use keel::common::{PageId, RecordId, SlotId};
//! use keel::index::BPlusTree;
//! use keel::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let tree = BPlusTree::new("orders_pk", bpm, 64, 64);
//! let rid = RecordId::new(PageId::new(7), SlotId::new(0));
//! tree.insert(42, rid).unwrap();
//! assert_eq!(tree.get_value(42).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod container;
pub mod execution;
pub mod index;
pub mod storage;

pub use common::{KeelError, PageId, RecordId, Result, SlotId};
