pub(crate) mod priority_queue;
#[cfg(test)]
pub(crate) mod rng;
