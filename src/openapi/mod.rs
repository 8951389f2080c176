use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "EduPay API",
        version = "1.0.0",
        description = r#"
# EduPay Order Settlement API

Checkout, settlement, discounting, referral rewards, VAT invoicing and
customer notifications for an online course platform.

## Flow

1. `POST /customers` registers a payer (optionally linked to a referrer).
2. `POST /checkout` creates a transaction over one or more courses, applies
   an optional discount code and returns the payment gateway redirect.
3. The gateway settles the payment and calls `POST /checkout/callback`;
   the transaction completes, course entitlements are granted and referral
   rewards are credited.
4. `POST /invoices/requests` asks for a VAT invoice over settled records;
   the back office approves or rejects it.

## Error Handling

Failing endpoints return a consistent error body:

```json
{
  "error": "Conflict",
  "message": "Transaction ... already settled",
  "request_id": "req-abc123",
  "timestamp": "2026-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20) query
parameters.
        "#,
        contact(
            name = "EduPay Support",
            email = "support@edupay.example"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Checkout and settlement endpoints"),
        (name = "Discounts", description = "Discount code management"),
        (name = "Customers", description = "Registration, referrals and entitlements"),
        (name = "Invoices", description = "Invoice requests and documents"),
        (name = "Notifications", description = "Customer notification inbox"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Checkout / settlement
        crate::handlers::checkout::start_checkout,
        crate::handlers::checkout::gateway_callback,
        crate::handlers::checkout::simulate_settlement,
        crate::handlers::checkout::get_transaction,
        crate::handlers::checkout::list_customer_transactions,

        // Discounts
        crate::handlers::discounts::create_discount,
        crate::handlers::discounts::preview_discount,

        // Customers
        crate::handlers::customers::register_customer,
        crate::handlers::customers::referral_summary,
        crate::handlers::customers::list_entitlements,

        // Invoicing
        crate::handlers::invoices::request_invoice,
        crate::handlers::invoices::pending_invoice_requests,
        crate::handlers::invoices::process_invoice_request,
        crate::handlers::invoices::get_invoice_request,
        crate::handlers::invoices::list_customer_invoices,
        crate::handlers::invoices::download_invoice_document,

        // Notifications
        crate::handlers::notifications::notification_inbox,
        crate::handlers::notifications::mark_notification_read,
    ),
    components(
        schemas(
            // Common types
            crate::ApiResponse<serde_json::Value>,
            crate::PaginatedResponse<serde_json::Value>,
            crate::ListQuery,

            // Checkout types
            crate::handlers::checkout::StartCheckoutRequest,
            crate::handlers::checkout::CheckoutItemRequest,
            crate::handlers::checkout::SimulateSettlementRequest,
            crate::handlers::checkout::TransactionResponse,
            crate::handlers::checkout::PaymentRecordResponse,
            crate::handlers::checkout::TransactionDetailsResponse,
            crate::services::settlements::StartedCheckout,
            crate::services::gateway::PaymentNotification,

            // Discount types
            crate::handlers::discounts::CreateDiscountRequest,
            crate::handlers::discounts::DiscountCodeResponse,
            crate::handlers::discounts::DiscountPreviewResponse,

            // Customer types
            crate::handlers::customers::RegisterCustomerRequest,
            crate::handlers::customers::CustomerResponse,
            crate::handlers::customers::EntitlementsResponse,
            crate::services::referrals::ReferralSummary,

            // Invoice types
            crate::handlers::invoices::RequestInvoiceRequest,
            crate::handlers::invoices::ProcessInvoiceRequest,
            crate::handlers::invoices::InvoiceRequestResponse,

            // Notification types
            crate::handlers::notifications::NotificationResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
