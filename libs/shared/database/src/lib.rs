pub mod query;
pub mod supabase;

pub use query::QueryBuilder;
pub use supabase::SupabaseClient;
