use std::sync::Arc;

use axum_orders_api::{
    cache::Cache,
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        auth::{RegisterRequest, VerifyEmailRequest},
        customers::{AttachOrdersRequest, CreateCustomerRequest},
        orders::{CreateOrderRequest, UpdateOrderRequest},
    },
    entity::orders::ActiveModel as OrderActive,
    entity::users::ActiveModel as UserActive,
    error::AppError,
    mailer::NoopMailer,
    middleware::auth::AuthUser,
    models::{order_category, order_status, roles},
    routes::params::{OrderListQuery, Pagination},
    services::{auth_service, customer_service, order_service, stats_service},
    state::AppState,
};
use chrono::{Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use uuid::Uuid;

// Integration flow: freelancer creates and updates orders, ownership gates
// hold across roles, customer attach is additive-only, list pages invalidate
// on writes, and statistics reflect DONE orders.
#[tokio::test]
async fn order_management_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB or Redis is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };
    let redis_url = match std::env::var("REDIS_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: set REDIS_URL to run integration flow tests.");
            return Ok(());
        }
    };

    let state = setup_state(&database_url, &redis_url).await?;

    // Seed users
    let admin_id = create_user(&state, roles::ADMIN, "admin@example.com").await?;
    let u1_id = create_user(&state, roles::FREELANCER, "u1@example.com").await?;
    let u2_id = create_user(&state, roles::FREELANCER, "u2@example.com").await?;

    let admin = auth_user(admin_id, roles::ADMIN);
    let u1 = auth_user(u1_id, roles::FREELANCER);
    let u2 = auth_user(u2_id, roles::FREELANCER);

    // U1 creates an order
    let created = order_service::create_order(
        &state,
        &u1,
        CreateOrderRequest {
            title: "Landing page".into(),
            description: "Marketing site".into(),
            price: 1000,
            start_date: Utc::now(),
            end_date: Utc::now() + Duration::days(14),
            category: order_category::DEVELOPMENT.into(),
            customer_id: None,
        },
    )
    .await?;
    let order = created.data.unwrap();
    assert_eq!(order.status, order_status::NEW);
    assert_eq!(order.user_id, u1_id);

    // Ownership gate: U2 gets Forbidden, not NotFound
    let err = order_service::get_order(&state, &u2, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Admin bypasses the ownership gate
    let as_admin = order_service::get_order(&state, &admin, order.id).await?;
    assert_eq!(as_admin.data.unwrap().price, 1000);

    // Nonexistent resources are NotFound for every role
    let err = order_service::get_order(&state, &admin, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Round-trip: update the price, everything else untouched
    let updated = order_service::update_order(
        &state,
        &u1,
        order.id,
        UpdateOrderRequest {
            price: Some(2000),
            ..Default::default()
        },
    )
    .await?;
    assert_eq!(updated.data.unwrap().price, 2000);

    let fetched = order_service::get_order(&state, &u1, order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(fetched.price, 2000);
    assert_eq!(fetched.title, "Landing page");
    assert_eq!(fetched.category, order_category::DEVELOPMENT);

    // Customer attach is additive-only
    let customer = customer_service::create_customer(
        &state,
        &u1,
        CreateCustomerRequest {
            full_name: "Acme GmbH".into(),
            email: Some("hello@acme.test".into()),
            telegram: None,
            company: Some("Acme".into()),
        },
    )
    .await?
    .data
    .unwrap();

    // U2 does not own the order being attached
    let err = customer_service::attach_orders(
        &state,
        &u2,
        customer.id,
        AttachOrdersRequest {
            order_ids: vec![order.id],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    customer_service::attach_orders(
        &state,
        &u1,
        customer.id,
        AttachOrdersRequest {
            order_ids: vec![order.id],
        },
    )
    .await?;

    // Second attach of the same order is a Conflict, not a silent success
    let err = customer_service::attach_orders(
        &state,
        &u1,
        customer.id,
        AttachOrdersRequest {
            order_ids: vec![order.id],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    // Detach frees the link, after which attach succeeds again
    customer_service::detach_order(&state, &u1, customer.id, order.id).await?;
    customer_service::attach_orders(
        &state,
        &u1,
        customer.id,
        AttachOrdersRequest {
            order_ids: vec![order.id],
        },
    )
    .await?;

    // U1 shares an order with the customer, U2 does not
    assert!(customer_service::get_customer(&state, &u1, customer.id)
        .await
        .is_ok());
    let err = customer_service::get_customer(&state, &u2, customer.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let u1_customers = customer_service::list_customers(&state, &u1, Default::default()).await?;
    assert_eq!(u1_customers.data.unwrap().items.len(), 1);
    let u2_customers = customer_service::list_customers(&state, &u2, Default::default()).await?;
    assert!(u2_customers.data.unwrap().items.is_empty());

    // Pagination over 45 rows with 20 per page
    seed_orders(&state, u2_id, 45).await?;

    let page1 = order_service::list_orders(&state, &u2, page_query(1, 20)).await?;
    let meta = page1.meta.clone().unwrap();
    assert_eq!(page1.data.unwrap().items.len(), 20);
    assert_eq!(meta.total, 45);
    assert_eq!(meta.last_page, 3);
    assert_eq!(meta.prev, None);
    assert_eq!(meta.next, Some(2));

    let page3 = order_service::list_orders(&state, &u2, page_query(3, 20)).await?;
    let meta = page3.meta.clone().unwrap();
    assert_eq!(page3.data.unwrap().items.len(), 5);
    assert_eq!(meta.prev, Some(2));
    assert_eq!(meta.next, None);

    // A write invalidates the cached page: the next read sees the new row
    order_service::create_order(
        &state,
        &u2,
        CreateOrderRequest {
            title: "One more".into(),
            description: "Freshly created".into(),
            price: 10,
            start_date: Utc::now(),
            end_date: Utc::now() + Duration::days(1),
            category: order_category::OTHER.into(),
            customer_id: None,
        },
    )
    .await?;
    let after_write = order_service::list_orders(&state, &u2, page_query(1, 20)).await?;
    assert_eq!(after_write.meta.unwrap().total, 46);

    // Statistics: only DONE orders count toward income
    order_service::update_order(
        &state,
        &u1,
        order.id,
        UpdateOrderRequest {
            status: Some(order_status::DONE.into()),
            ..Default::default()
        },
    )
    .await?;
    let income = stats_service::income(&state, &u1, u1_id).await?;
    assert_eq!(income.data.unwrap().total, 2000);

    // Stats are self-gated for non-admins
    let err = stats_service::income(&state, &u2, u1_id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    assert!(stats_service::income(&state, &admin, u1_id).await.is_ok());

    // Registration stores a one-time code; the code verifies the email
    // exactly once. Logout puts the presented token on the revocation ledger.
    let email = format!("verify-{}@example.com", Uuid::new_v4());

    let registered = auth_service::register_user(
        &state,
        RegisterRequest {
            first_name: "Vera".into(),
            last_name: "Fied".into(),
            email: email.clone(),
            password: "secret123".into(),
            country: None,
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(registered.role, roles::FREELANCER);
    assert_eq!(registered.is_email_verified, Some(false));

    // The emailed code is readable through the same store the service uses
    let code = state.cache.get_code(&email).await?.expect("code stored");

    if code != "000000" {
        let err = auth_service::verify_email(
            &state,
            VerifyEmailRequest {
                email: email.clone(),
                code: "000000".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    let verified = auth_service::verify_email(
        &state,
        VerifyEmailRequest {
            email: email.clone(),
            code: code.clone(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(verified.is_email_verified, Some(true));

    // The code is single-use
    assert!(state.cache.get_code(&email).await?.is_none());

    // Logout revokes the presented token for its remaining lifetime
    let token = format!("test-token-{}", Uuid::new_v4());
    let user = AuthUser {
        user_id: registered.id,
        role: registered.role.clone(),
        token: token.clone(),
    };
    assert!(!state.cache.is_token_revoked(&token).await?);
    auth_service::logout_user(&state, &user).await?;
    assert!(state.cache.is_token_revoked(&token).await?);

    Ok(())
}

fn auth_user(user_id: Uuid, role: &str) -> AuthUser {
    AuthUser {
        user_id,
        role: role.into(),
        token: format!("token-{user_id}"),
    }
}

fn page_query(page: i64, per_page: i64) -> OrderListQuery {
    OrderListQuery {
        pagination: Pagination {
            page: Some(page),
            per_page: Some(per_page),
        },
        ..Default::default()
    }
}

fn test_config(database_url: &str, redis_url: &str) -> AppConfig {
    AppConfig {
        database_url: database_url.into(),
        redis_url: redis_url.into(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_access_secret: "test-access-secret".into(),
        jwt_refresh_secret: "test-refresh-secret".into(),
        jwt_access_expiry_secs: 3600,
        jwt_refresh_expiry_secs: 7 * 24 * 3600,
        smtp_host: "127.0.0.1".into(),
        smtp_port: 1025,
        smtp_username: String::new(),
        smtp_password: String::new(),
        smtp_from: "no-reply@orders.local".into(),
    }
}

async fn build_state(database_url: &str, redis_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    let cache = Cache::connect(redis_url)?;
    cache
        .invalidate_prefixes(&[
            "users", "user", "orders", "order", "customers", "customer", "stats",
        ])
        .await;

    Ok(AppState {
        pool,
        orm,
        cache,
        mailer: Arc::new(NoopMailer),
        config: Arc::new(test_config(database_url, redis_url)),
    })
}

async fn setup_state(database_url: &str, redis_url: &str) -> anyhow::Result<AppState> {
    let state = build_state(database_url, redis_url).await?;

    // Clean tables between runs
    let backend = state.orm.get_database_backend();
    state
        .orm
        .execute(Statement::from_string(
            backend,
            "TRUNCATE TABLE orders, customers, audit_logs, users RESTART IDENTITY CASCADE",
        ))
        .await?;

    Ok(state)
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        first_name: Set("Test".into()),
        last_name: Set(role.to_lowercase()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        country: Set(None),
        is_email_verified: Set(Some(true)),
        role: Set(role.into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn seed_orders(state: &AppState, owner: Uuid, count: usize) -> anyhow::Result<()> {
    let now = Utc::now();
    for i in 0..count {
        // Distinct created_at keeps the page slicing deterministic.
        OrderActive {
            id: Set(Uuid::new_v4()),
            title: Set(format!("Order {i}")),
            description: Set("Seeded".into()),
            price: Set(100),
            start_date: Set(now.into()),
            end_date: Set((now + Duration::days(7)).into()),
            category: Set(order_category::OTHER.into()),
            status: Set(order_status::NEW.into()),
            user_id: Set(owner),
            customer_id: Set(None),
            created_at: Set((now - Duration::seconds(i as i64)).into()),
            updated_at: Set(now.into()),
        }
        .insert(&state.orm)
        .await?;
    }
    Ok(())
}
