pub trait ViamLogAdapter {
    fn before_log_setup(&self);
    fn get_level_filter(&self) -> ::log::LevelFilter;
    fn new() -> Self;
}

// The logger should satisfy log::Log and the ViamLogAdapter trait and then be initialized using
// this function at the start of main. Only the first call installs a logger.
pub fn initialize_logger<T: ::log::Log + ViamLogAdapter + 'static>() {
    let logger = T::new();
    let filter = logger.get_level_filter();
    logger.before_log_setup();
    if ::log::set_boxed_logger(Box::new(logger)).is_ok() {
        ::log::set_max_level(filter)
    }
}
