use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{
            ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
            ResetPasswordRequest, TokenPair, VerifyEmailRequest,
        },
        customers::{
            AttachOrdersRequest, CreateCustomerRequest, CustomerList, UpdateCustomerRequest,
        },
        orders::{CreateOrderRequest, OrderList, UpdateOrderRequest},
        stats::{CategoryCount, IncomeStats, StatusCount},
        users::{ChangePasswordRequest, UpdateUserRequest, UserList},
    },
    models::{Customer, Order, User},
    pagination::PageMeta,
    response::ApiResponse,
    routes::{auth, customers, health, orders, params, stats, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        auth::refresh,
        auth::logout,
        auth::verify_email,
        auth::forgot_password,
        auth::reset_password,
        users::list_users,
        users::get_user,
        users::update_user,
        users::change_password,
        users::delete_user,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::update_order,
        orders::delete_order,
        customers::list_customers,
        customers::create_customer,
        customers::get_customer,
        customers::update_customer,
        customers::delete_customer,
        customers::attach_orders,
        customers::detach_order,
        customers::list_customer_orders,
        stats::orders_by_status,
        stats::orders_by_category,
        stats::income
    ),
    components(
        schemas(
            User,
            Order,
            Customer,
            RegisterRequest,
            LoginRequest,
            TokenPair,
            RefreshRequest,
            VerifyEmailRequest,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            UpdateUserRequest,
            ChangePasswordRequest,
            UserList,
            CreateOrderRequest,
            UpdateOrderRequest,
            OrderList,
            CreateCustomerRequest,
            UpdateCustomerRequest,
            AttachOrdersRequest,
            CustomerList,
            StatusCount,
            CategoryCount,
            IncomeStats,
            params::Pagination,
            params::OrderListQuery,
            params::UserListQuery,
            params::CustomerListQuery,
            PageMeta,
            ApiResponse<User>,
            ApiResponse<Order>,
            ApiResponse<Customer>,
            ApiResponse<UserList>,
            ApiResponse<OrderList>,
            ApiResponse<CustomerList>,
            ApiResponse<TokenPair>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "User endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Customers", description = "Customer endpoints"),
        (name = "Stats", description = "Statistics endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
