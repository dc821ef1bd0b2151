pub mod cpu;
pub mod encoder;
pub mod error;
pub mod mnemonic;
pub mod reg;
pub mod schema;

pub use cpu::{Mode, TargetCpu};
pub use encoder::{encode, is_constant_size, schemas, Arg, Context, Imm};
pub use error::Error;
pub use mnemonic::Mnemonic;
pub use reg::Reg;
pub use schema::Schema;
