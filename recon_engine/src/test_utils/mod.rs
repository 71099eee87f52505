pub mod alarms;
pub mod prepare_env;
