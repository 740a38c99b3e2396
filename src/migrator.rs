use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_approval_tables::Migration),
            Box::new(m20240601_000003_create_sales_pipeline_tables::Migration),
            Box::new(m20240601_000004_create_audit_and_notification_tables::Migration),
        ]
    }
}

mod m20240601_000001_create_catalog_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::ProductType).string_len(20).not_null())
                        .col(ColumnDef::new(Products::Brands).json().not_null())
                        .col(
                            ColumnDef::new(Products::IsGlobal)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(InventoryUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryUnits::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryUnits::SerialNumber).string().null())
                        .col(
                            ColumnDef::new(InventoryUnits::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::HeldQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::SaleStatus)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::AvailableOnline)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::SellingPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::CompareAtPrice)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryUnits::ReservedBy).uuid().null())
                        .col(
                            ColumnDef::new(InventoryUnits::ReservedUntil)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryUnits::ReservationId).uuid().null())
                        .col(ColumnDef::new(InventoryUnits::Brands).json().not_null())
                        .col(
                            ColumnDef::new(InventoryUnits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_inventory_units_product")
                                .from(InventoryUnits::Table, InventoryUnits::ProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_units_sale_status")
                        .table(InventoryUnits::Table)
                        .col(InventoryUnits::SaleStatus)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_units_product_id")
                        .table(InventoryUnits::Table)
                        .col(InventoryUnits::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Staff::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Staff::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Staff::Name).string().not_null())
                        .col(ColumnDef::new(Staff::Role).string_len(30).not_null())
                        .col(ColumnDef::new(Staff::Brands).json().not_null())
                        .col(
                            ColumnDef::new(Staff::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Staff::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Customers::Phone)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Customers::Name).string().not_null())
                        .col(ColumnDef::new(Customers::Email).string().null())
                        .col(ColumnDef::new(Customers::DeliveryAddress).string().null())
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
                .create_table(
                    Table::create()
                        .table(Promotions::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Promotions::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Promotions::BrandId).uuid().null())
                        .col(ColumnDef::new(Promotions::Title).string().not_null())
                        .col(
                            ColumnDef::new(Promotions::DiscountPercentage)
                                .decimal_len(5, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::DiscountAmount)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::StartDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::EndDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Promotions::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Promotions::ProductIds).json().not_null())
                        .col(ColumnDef::new(Promotions::ProductTypes).json().not_null())
                        .col(
                            ColumnDef::new(Promotions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Bundles::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bundles::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bundles::BrandId).uuid().null())
                        .col(ColumnDef::new(Bundles::MainProductId).uuid().not_null())
                        .col(ColumnDef::new(Bundles::Title).string().not_null())
                        .col(ColumnDef::new(Bundles::PricingMode).string_len(10).not_null())
                        .col(ColumnDef::new(Bundles::BundlePrice).decimal_len(16, 4).null())
                        .col(
                            ColumnDef::new(Bundles::DiscountPercentage)
                                .decimal_len(5, 2)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Bundles::DiscountAmount)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Bundles::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Bundles::StartDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Bundles::EndDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Bundles::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bundles_main_product")
                                .from(Bundles::Table, Bundles::MainProductId)
                                .to(Products::Table, Products::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(BundleItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(BundleItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(BundleItems::BundleId).uuid().not_null())
                        .col(ColumnDef::new(BundleItems::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(BundleItems::Quantity)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(BundleItems::OverridePrice)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(BundleItems::DisplayOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bundle_items_bundle")
                                .from(BundleItems::Table, BundleItems::BundleId)
                                .to(Bundles::Table, Bundles::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DeliveryRates::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(DeliveryRates::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(DeliveryRates::County).string().not_null())
                        .col(ColumnDef::new(DeliveryRates::Ward).string().null())
                        .col(
                            ColumnDef::new(DeliveryRates::Price)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(DeliveryRates::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DeliveryRates::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(BundleItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Bundles::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Promotions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Staff::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(InventoryUnits::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        ProductType,
        Brands,
        IsGlobal,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryUnits {
        Table,
        Id,
        ProductId,
        SerialNumber,
        Quantity,
        HeldQuantity,
        SaleStatus,
        AvailableOnline,
        SellingPrice,
        CompareAtPrice,
        ReservedBy,
        ReservedUntil,
        ReservationId,
        Brands,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Staff {
        Table,
        Id,
        Name,
        Role,
        Brands,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Customers {
        Table,
        Id,
        Phone,
        Name,
        Email,
        DeliveryAddress,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Promotions {
        Table,
        Id,
        BrandId,
        Title,
        DiscountPercentage,
        DiscountAmount,
        StartDate,
        EndDate,
        IsActive,
        ProductIds,
        ProductTypes,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Bundles {
        Table,
        Id,
        BrandId,
        MainProductId,
        Title,
        PricingMode,
        BundlePrice,
        DiscountPercentage,
        DiscountAmount,
        IsActive,
        StartDate,
        EndDate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum BundleItems {
        Table,
        Id,
        BundleId,
        ProductId,
        Quantity,
        OverridePrice,
        DisplayOrder,
    }

    #[derive(DeriveIden)]
    enum DeliveryRates {
        Table,
        Id,
        County,
        Ward,
        Price,
        IsActive,
    }
}

mod m20240601_000002_create_approval_tables {

    use super::m20240601_000001_create_catalog_tables::InventoryUnits;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_approval_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReservationRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReservationRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationRequests::RequestedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationRequests::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReservationRequests::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(ReservationRequests::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReservationRequests::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(ReservationRequests::Notes).text().null())
                        .col(
                            ColumnDef::new(ReservationRequests::RequestedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationRequests::UpdatedAt)
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
                        .name("idx_reservation_requests_status_expires_at")
                        .table(ReservationRequests::Table)
                        .col(ReservationRequests::Status)
                        .col(ReservationRequests::ExpiresAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReservationRequestUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReservationRequestUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationRequestUnits::ReservationRequestId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReservationRequestUnits::UnitId)
                                .uuid()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reservation_request_units_request")
                                .from(
                                    ReservationRequestUnits::Table,
                                    ReservationRequestUnits::ReservationRequestId,
                                )
                                .to(ReservationRequests::Table, ReservationRequests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_reservation_request_units_unit")
                                .from(
                                    ReservationRequestUnits::Table,
                                    ReservationRequestUnits::UnitId,
                                )
                                .to(InventoryUnits::Table, InventoryUnits::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnRequests::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnRequests::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnRequests::RequestedBy).uuid().null())
                        .col(
                            ColumnDef::new(ReturnRequests::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnRequests::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(ReturnRequests::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(ReturnRequests::Notes).text().null())
                        .col(
                            ColumnDef::new(ReturnRequests::RequestedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnRequests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ReturnRequestUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReturnRequestUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReturnRequestUnits::ReturnRequestId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ReturnRequestUnits::UnitId).uuid().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_request_units_request")
                                .from(
                                    ReturnRequestUnits::Table,
                                    ReturnRequestUnits::ReturnRequestId,
                                )
                                .to(ReturnRequests::Table, ReturnRequests::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_return_request_units_unit")
                                .from(ReturnRequestUnits::Table, ReturnRequestUnits::UnitId)
                                .to(InventoryUnits::Table, InventoryUnits::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(UnitTransfers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UnitTransfers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UnitTransfers::UnitId).uuid().not_null())
                        .col(
                            ColumnDef::new(UnitTransfers::FromSalesperson)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UnitTransfers::ToSalesperson)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UnitTransfers::Status)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(UnitTransfers::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(UnitTransfers::ApprovedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(UnitTransfers::Notes).text().null())
                        .col(
                            ColumnDef::new(UnitTransfers::RequestedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UnitTransfers::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_unit_transfers_unit")
                                .from(UnitTransfers::Table, UnitTransfers::UnitId)
                                .to(InventoryUnits::Table, InventoryUnits::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UnitTransfers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReturnRequestUnits::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReturnRequests::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReservationRequestUnits::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ReservationRequests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum ReservationRequests {
        Table,
        Id,
        RequestedBy,
        Status,
        ApprovedBy,
        ApprovedAt,
        ExpiresAt,
        Notes,
        RequestedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ReservationRequestUnits {
        Table,
        Id,
        ReservationRequestId,
        UnitId,
    }

    #[derive(DeriveIden)]
    enum ReturnRequests {
        Table,
        Id,
        RequestedBy,
        Status,
        ApprovedBy,
        ApprovedAt,
        Notes,
        RequestedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ReturnRequestUnits {
        Table,
        Id,
        ReturnRequestId,
        UnitId,
    }

    #[derive(DeriveIden)]
    enum UnitTransfers {
        Table,
        Id,
        UnitId,
        FromSalesperson,
        ToSalesperson,
        Status,
        ApprovedBy,
        ApprovedAt,
        Notes,
        RequestedAt,
        UpdatedAt,
    }
}

mod m20240601_000003_create_sales_pipeline_tables {

    use super::m20240601_000001_create_catalog_tables::{Customers, InventoryUnits};
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_sales_pipeline_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Carts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Carts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Carts::BrandId).uuid().null())
                        .col(ColumnDef::new(Carts::SessionKey).string().null())
                        .col(ColumnDef::new(Carts::CustomerPhone).string().null())
                        .col(ColumnDef::new(Carts::CustomerId).uuid().null())
                        .col(
                            ColumnDef::new(Carts::IsSubmitted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Carts::LeadId).uuid().null())
                        .col(
                            ColumnDef::new(Carts::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Carts::UpdatedAt)
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
                        .name("idx_carts_session_key")
                        .table(Carts::Table)
                        .col(Carts::SessionKey)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_carts_customer_phone")
                        .table(Carts::Table)
                        .col(Carts::CustomerPhone)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CartItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(CartItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(CartItems::CartId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::UnitId).uuid().not_null())
                        .col(ColumnDef::new(CartItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(CartItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(CartItems::PromotionId).uuid().null())
                        .col(ColumnDef::new(CartItems::BundleId).uuid().null())
                        .col(ColumnDef::new(CartItems::BundleGroupId).uuid().null())
                        .col(
                            ColumnDef::new(CartItems::AddedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_cart")
                                .from(CartItems::Table, CartItems::CartId)
                                .to(Carts::Table, Carts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_cart_items_unit")
                                .from(CartItems::Table, CartItems::UnitId)
                                .to(InventoryUnits::Table, InventoryUnits::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Leads::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Leads::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Leads::Reference)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Leads::BrandId).uuid().null())
                        .col(ColumnDef::new(Leads::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Leads::CustomerName).string().not_null())
                        .col(ColumnDef::new(Leads::CustomerPhone).string().not_null())
                        .col(ColumnDef::new(Leads::CustomerEmail).string().null())
                        .col(ColumnDef::new(Leads::DeliveryCounty).string().null())
                        .col(ColumnDef::new(Leads::DeliveryWard).string().null())
                        .col(ColumnDef::new(Leads::DeliveryAddress).text().null())
                        .col(ColumnDef::new(Leads::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Leads::AssignedTo).uuid().null())
                        .col(
                            ColumnDef::new(Leads::TotalValue)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Leads::DeliveryFee)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Leads::CheckoutKey).string().null())
                        .col(ColumnDef::new(Leads::OrderId).uuid().null())
                        .col(
                            ColumnDef::new(Leads::ExpiresAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Leads::ContactedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Leads::ConvertedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Leads::ClosedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Leads::SubmittedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Leads::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_leads_customer")
                                .from(Leads::Table, Leads::CustomerId)
                                .to(Customers::Table, Customers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_leads_status")
                        .table(Leads::Table)
                        .col(Leads::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LeadItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(LeadItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(LeadItems::LeadId).uuid().not_null())
                        .col(ColumnDef::new(LeadItems::UnitId).uuid().not_null())
                        .col(ColumnDef::new(LeadItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(LeadItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(LeadItems::PromotionId).uuid().null())
                        .col(ColumnDef::new(LeadItems::BundleId).uuid().null())
                        .col(ColumnDef::new(LeadItems::BundleGroupId).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lead_items_lead")
                                .from(LeadItems::Table, LeadItems::LeadId)
                                .to(Leads::Table, Leads::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::BrandId).uuid().null())
                        .col(ColumnDef::new(Orders::CustomerId).uuid().not_null())
                        .col(ColumnDef::new(Orders::LeadId).uuid().null())
                        .col(ColumnDef::new(Orders::CreatedBy).uuid().null())
                        .col(ColumnDef::new(Orders::Source).string_len(20).not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(20).not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveryFee)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::IdempotencyKey)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Orders::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::DeliveredAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CanceledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_orders_customer")
                                .from(Orders::Table, Orders::CustomerId)
                                .to(Customers::Table, Customers::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::UnitId).uuid().null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::BundleId).uuid().null())
                        .col(ColumnDef::new(OrderItems::BundleGroupId).uuid().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(Payments::TrackingId)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Payments::Amount).decimal_len(16, 4).not_null())
                        .col(ColumnDef::new(Payments::Status).string_len(20).not_null())
                        .col(ColumnDef::new(Payments::Method).string().null())
                        .col(
                            ColumnDef::new(Payments::CallbackCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Payments::LastCallbackAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Payments::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_order")
                                .from(Payments::Table, Payments::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LeadItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Leads::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(CartItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Carts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Carts {
        Table,
        Id,
        BrandId,
        SessionKey,
        CustomerPhone,
        CustomerId,
        IsSubmitted,
        LeadId,
        ExpiresAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum CartItems {
        Table,
        Id,
        CartId,
        UnitId,
        Quantity,
        UnitPrice,
        PromotionId,
        BundleId,
        BundleGroupId,
        AddedAt,
    }

    #[derive(DeriveIden)]
    enum Leads {
        Table,
        Id,
        Reference,
        BrandId,
        CustomerId,
        CustomerName,
        CustomerPhone,
        CustomerEmail,
        DeliveryCounty,
        DeliveryWard,
        DeliveryAddress,
        Status,
        AssignedTo,
        TotalValue,
        DeliveryFee,
        CheckoutKey,
        OrderId,
        ExpiresAt,
        ContactedAt,
        ConvertedAt,
        ClosedAt,
        SubmittedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum LeadItems {
        Table,
        Id,
        LeadId,
        UnitId,
        Quantity,
        UnitPrice,
        PromotionId,
        BundleId,
        BundleGroupId,
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        BrandId,
        CustomerId,
        LeadId,
        CreatedBy,
        Source,
        Status,
        TotalAmount,
        DeliveryFee,
        IdempotencyKey,
        PaidAt,
        DeliveredAt,
        CanceledAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        UnitId,
        Quantity,
        UnitPrice,
        BundleId,
        BundleGroupId,
    }

    #[derive(DeriveIden)]
    enum Payments {
        Table,
        Id,
        OrderId,
        TrackingId,
        Amount,
        Status,
        Method,
        CallbackCount,
        LastCallbackAt,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000004_create_audit_and_notification_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_audit_and_notification_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(AuditLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(AuditLogs::Actor).string().not_null())
                        .col(ColumnDef::new(AuditLogs::Action).string_len(50).not_null())
                        .col(ColumnDef::new(AuditLogs::Entity).json().not_null())
                        .col(ColumnDef::new(AuditLogs::OldValue).json().null())
                        .col(ColumnDef::new(AuditLogs::NewValue).json().null())
                        .col(ColumnDef::new(AuditLogs::Reason).text().null())
                        .col(
                            ColumnDef::new(AuditLogs::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

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
                            ColumnDef::new(Notifications::RecipientKind)
                                .string_len(20)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Notifications::RecipientId).uuid().not_null())
                        .col(ColumnDef::new(Notifications::Kind).string_len(40).not_null())
                        .col(ColumnDef::new(Notifications::Title).string().not_null())
                        .col(ColumnDef::new(Notifications::Message).text().not_null())
                        .col(ColumnDef::new(Notifications::Related).json().not_null())
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
                        .name("idx_notifications_recipient")
                        .table(Notifications::Table)
                        .col(Notifications::RecipientId)
                        .col(Notifications::IsRead)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(AuditLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AuditLogs {
        Table,
        Id,
        Actor,
        Action,
        Entity,
        OldValue,
        NewValue,
        Reason,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        RecipientKind,
        RecipientId,
        Kind,
        Title,
        Message,
        Related,
        IsRead,
        CreatedAt,
    }
}
