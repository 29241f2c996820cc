pub mod allocator;
pub mod cacher;
pub mod dataset;
pub mod description;
pub mod sizing;
pub mod sliceable;
pub mod storage;
pub mod supervised;
pub mod transform;
