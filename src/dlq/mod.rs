pub mod store;

pub use store::{
    DlqCursor, ListEntriesParams, ListEntriesResult, StoreError, get_entry, list_entries, requeue,
    resolve,
};
