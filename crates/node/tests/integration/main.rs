mod call;
mod filter;
mod fork;
mod mining;
mod pool;
mod snapshot;
