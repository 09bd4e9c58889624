//! 命令定义和实现

pub mod home;
pub mod run;
pub mod set;
pub mod show;

pub use home::HomeCommand;
pub use run::RunCommand;
pub use set::SetCommand;
pub use show::ShowCommand;
