pub mod command_handler;
pub mod query_handler;

pub use command_handler::FanoutCommandHandler;
pub use query_handler::FanoutQueryHandler;
