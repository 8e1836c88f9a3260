pub mod fixtures;

mod dex_roundtrip;
