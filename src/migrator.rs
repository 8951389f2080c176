use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240401_000001_create_customers_table::Migration),
            Box::new(m20240401_000002_create_discount_codes_table::Migration),
            Box::new(m20240401_000003_create_transactions_table::Migration),
            Box::new(m20240401_000004_create_payment_records_table::Migration),
            Box::new(m20240401_000005_create_invoice_sequences_table::Migration),
            Box::new(m20240401_000006_create_invoice_requests_table::Migration),
            Box::new(m20240401_000007_create_entitlements_table::Migration),
            Box::new(m20240401_000008_create_notifications_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240401_000001_create_customers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000001_create_customers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Customers::Email)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(
                            ColumnDef::new(Customers::ReferralCode)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Customers::ReferredBy).uuid().null())
                        .col(
                            ColumnDef::new(Customers::ReferralPoints)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Customers::ReferralRewarded)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Customers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_customers_referred_by")
                        .table(Customers::Table)
                        .col(Customers::ReferredBy)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        Email,
        Name,
        ReferralCode,
        ReferredBy,
        ReferralPoints,
        ReferralRewarded,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240401_000002_create_discount_codes_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000002_create_discount_codes_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(DiscountCodes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DiscountCodes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DiscountCodes::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(DiscountCodes::Percent)
                                .decimal_len(16, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DiscountCodes::ValidFrom)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DiscountCodes::ValidTo)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(DiscountCodes::MaxUses).integer().null())
                        .col(
                            ColumnDef::new(DiscountCodes::CurrentUses)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(DiscountCodes::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(DiscountCodes::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DiscountCodes::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum DiscountCodes {
        Table,
        Id,
        Code,
        Percent,
        ValidFrom,
        ValidTo,
        MaxUses,
        CurrentUses,
        Active,
        CreatedAt,
    }
}

mod m20240401_000003_create_transactions_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000003_create_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Transactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Transactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Transactions::CustomerId).uuid().not_null())
                        .col(
                            ColumnDef::new(Transactions::GatewayOrderId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(Transactions::Status).string().not_null())
                        .col(
                            ColumnDef::new(Transactions::OriginalTotal)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Transactions::DiscountTotal)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Transactions::Total)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Transactions::Currency).string().not_null())
                        .col(ColumnDef::new(Transactions::DiscountCodeId).uuid().null())
                        .col(ColumnDef::new(Transactions::PaymentMethod).string().null())
                        .col(ColumnDef::new(Transactions::GatewayMetadata).json().null())
                        .col(
                            ColumnDef::new(Transactions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Transactions::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_customer_id")
                        .table(Transactions::Table)
                        .col(Transactions::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_status")
                        .table(Transactions::Table)
                        .col(Transactions::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transactions_gateway_order_id")
                        .table(Transactions::Table)
                        .col(Transactions::GatewayOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Transactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Transactions {
        Table,
        Id,
        CustomerId,
        GatewayOrderId,
        Status,
        OriginalTotal,
        DiscountTotal,
        Total,
        Currency,
        DiscountCodeId,
        PaymentMethod,
        GatewayMetadata,
        CreatedAt,
        CompletedAt,
    }
}

mod m20240401_000004_create_payment_records_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000004_create_payment_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::TransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::CustomerId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentRecords::CourseId).uuid().not_null())
                        .col(
                            ColumnDef::new(PaymentRecords::CourseTitle)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::Amount)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::DiscountShare)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::FinalAmount)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PaymentRecords::Status).string().not_null())
                        .col(
                            ColumnDef::new(PaymentRecords::Invoiced)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::InvoiceRequestId)
                                .uuid()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PaymentRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_records_transaction_id")
                        .table(PaymentRecords::Table)
                        .col(PaymentRecords::TransactionId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_records_customer_id")
                        .table(PaymentRecords::Table)
                        .col(PaymentRecords::CustomerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentRecords {
        Table,
        Id,
        TransactionId,
        CustomerId,
        CourseId,
        CourseTitle,
        Amount,
        DiscountShare,
        FinalAmount,
        Status,
        Invoiced,
        InvoiceRequestId,
        CreatedAt,
    }
}

mod m20240401_000005_create_invoice_sequences_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000005_create_invoice_sequences_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InvoiceSequences::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceSequences::Id)
                                .integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceSequences::Year).integer().not_null())
                        .col(
                            ColumnDef::new(InvoiceSequences::CurrentOrdinal)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceSequences::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InvoiceSequences {
        Table,
        Id,
        Year,
        CurrentOrdinal,
    }
}

mod m20240401_000006_create_invoice_requests_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000006_create_invoice_requests_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InvoiceRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InvoiceRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::CustomerId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceRequests::Status).string().not_null())
                        .col(
                            ColumnDef::new(InvoiceRequests::BuyerName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::BuyerAddress)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::BuyerPostalCode)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::BuyerCity)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InvoiceRequests::BuyerNip).string().null())
                        .col(
                            ColumnDef::new(InvoiceRequests::Company)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::PaymentIds)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::Total)
                                .decimal_len(16, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::InvoiceNumber)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::DocumentPath)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(InvoiceRequests::Comment).string().null())
                        .col(
                            ColumnDef::new(InvoiceRequests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InvoiceRequests::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_requests_customer_id")
                        .table(InvoiceRequests::Table)
                        .col(InvoiceRequests::CustomerId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_requests_status")
                        .table(InvoiceRequests::Table)
                        .col(InvoiceRequests::Status)
                        .to_owned(),
                )
                .await?;

            // Issued numbers must never repeat, even across request rows.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_invoice_requests_invoice_number")
                        .table(InvoiceRequests::Table)
                        .col(InvoiceRequests::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InvoiceRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InvoiceRequests {
        Table,
        Id,
        CustomerId,
        Status,
        BuyerName,
        BuyerAddress,
        BuyerPostalCode,
        BuyerCity,
        BuyerNip,
        Company,
        PaymentIds,
        Total,
        InvoiceNumber,
        DocumentPath,
        Comment,
        CreatedAt,
        ProcessedAt,
    }
}

mod m20240401_000007_create_entitlements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000007_create_entitlements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Entitlements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Entitlements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Entitlements::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Entitlements::CourseId).uuid().not_null())
                        .col(
                            ColumnDef::new(Entitlements::TransactionId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Entitlements::GrantedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The set-union guarantee: one grant per (customer, course).
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_entitlements_customer_course")
                        .table(Entitlements::Table)
                        .col(Entitlements::CustomerId)
                        .col(Entitlements::CourseId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Entitlements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Entitlements {
        Table,
        Id,
        CustomerId,
        CourseId,
        TransactionId,
        GrantedAt,
    }
}

mod m20240401_000008_create_notifications_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240401_000008_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::CustomerId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::Kind).string().not_null())
                        .col(ColumnDef::new(Notifications::Subject).string().not_null())
                        .col(ColumnDef::new(Notifications::Body).string().not_null())
                        .col(ColumnDef::new(Notifications::Context).json().null())
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_customer_id")
                        .table(Notifications::Table)
                        .col(Notifications::CustomerId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        CustomerId,
        Kind,
        Subject,
        Body,
        Context,
        IsRead,
        CreatedAt,
    }
}
