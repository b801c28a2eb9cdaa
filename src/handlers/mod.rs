pub mod compose;
pub mod http;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;
