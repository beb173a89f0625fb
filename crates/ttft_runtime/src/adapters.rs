pub mod gpu_monitor;
pub mod http_stream;
pub mod prometheus;
pub mod subprocess;
