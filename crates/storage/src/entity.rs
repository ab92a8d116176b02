pub mod audit_records {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "audit_records")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub session_id: String,
        pub tx_hash: String,
        pub from_address: String,
        pub to_address: Option<String>,
        /// Exact decimal amount in the native unit, kept as text.
        pub value: String,
        pub block_number: i64,
        pub direction: String,
        pub observed_at: DateTimeUtc,
    }

    #[derive(Debug, Clone, Copy, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
