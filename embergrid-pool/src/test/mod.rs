mod pool;
mod profiled;
