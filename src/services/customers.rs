use crate::{
    entities::{customer, Customer, CustomerModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;
use validator::Validate;

/// Contact details used to look up or register a customer
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CustomerInput {
    pub phone: String,
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub delivery_address: Option<String>,
}

impl CustomerInput {
    pub fn with_phone(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            ..Default::default()
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Finds a customer by phone, or creates one. Idempotent on the trimmed phone.
///
/// An existing customer picks up a non-empty name, and email or address when given.
pub async fn find_or_create_customer<C: ConnectionTrait>(
    conn: &C,
    input: &CustomerInput,
) -> Result<CustomerModel, ServiceError> {
    input.validate()?;
    let phone = input.phone.trim();
    if phone.is_empty() {
        return Err(ServiceError::ValidationError(
            "Customer phone number is required".to_string(),
        ));
    }
    let name = non_blank(&input.name);
    let email = non_blank(&input.email);
    let address = non_blank(&input.delivery_address);

    let existing = Customer::find()
        .filter(customer::Column::Phone.eq(phone))
        .one(conn)
        .await?;

    let now = Utc::now();
    match existing {
        Some(found) => {
            if name.is_none() && email.is_none() && address.is_none() {
                return Ok(found);
            }
            let mut active: customer::ActiveModel = found.into();
            if let Some(name) = name {
                active.name = Set(name);
            }
            if let Some(email) = email {
                active.email = Set(Some(email));
            }
            if let Some(address) = address {
                active.delivery_address = Set(Some(address));
            }
            active.updated_at = Set(now);
            Ok(active.update(conn).await?)
        }
        None => {
            debug!(phone, "registering new customer");
            Ok(customer::ActiveModel {
                id: Set(Uuid::new_v4()),
                phone: Set(phone.to_string()),
                name: Set(name.unwrap_or_default()),
                email: Set(email),
                delivery_address: Set(address),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await?)
        }
    }
}

#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn find_or_create_customer(
        &self,
        input: CustomerInput,
    ) -> Result<CustomerModel, ServiceError> {
        find_or_create_customer(&*self.db, &input).await
    }

    #[instrument(skip(self))]
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<CustomerModel>, ServiceError> {
        Ok(Customer::find()
            .filter(customer::Column::Phone.eq(phone.trim()))
            .one(&*self.db)
            .await?)
    }
}
