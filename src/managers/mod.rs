// marksync tree managers
// Managers mutate bookmark trees: building them, applying diffs, and reading/writing local stores.

pub mod change_applier;
pub mod local_store;
pub mod tree_builder;
