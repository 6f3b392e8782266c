//! Schema model: descriptors in, immutable table infos out.

pub mod descriptor;
pub mod registry;
pub mod table;

pub use descriptor::{EntityDescriptor, LinkDescriptor, MemberDescriptor, ReferentialAction};
pub use registry::{Schema, SchemaBuilder};
pub use table::{DISCRIMINATOR_MEMBER, LinkKind, LinkTable, TableId, TableInfo, TableMemberInfo};
