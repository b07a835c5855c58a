pub mod audit_cmd;
pub mod generate;
pub mod keygen;
pub mod serve;
pub mod users;
