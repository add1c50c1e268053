diesel::table! {
    account_transactions (account_id, transaction_id) {
        account_id -> Uuid,
        transaction_id -> Uuid,
        role -> Varchar,
        currency_code -> Varchar,
        amount -> Numeric,
        fee -> Numeric,
    }
}

diesel::table! {
    accounts (id) {
        id -> Uuid,
        account_number -> Varchar,
        user_id -> Uuid,
        currency_id -> Uuid,
        account_type -> Varchar,
        balance -> Numeric,
        overdraft_limit -> Nullable<Numeric>,
        interest_rate -> Nullable<Numeric>,
        accrual_schedule -> Nullable<Varchar>,
        created_at -> Timestamptz,
        is_active -> Bool,
        version -> Int4,
    }
}

diesel::table! {
    currencies (id) {
        id -> Uuid,
        code -> Varchar,
        exchange_rate -> Numeric,
        is_base -> Bool,
        is_active -> Bool,
    }
}

diesel::table! {
    interest_logs (id) {
        id -> Uuid,
        account_id -> Uuid,
        amount -> Numeric,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    transactions (id) {
        id -> Uuid,
        transaction_type -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(account_transactions -> accounts (account_id));
diesel::joinable!(account_transactions -> transactions (transaction_id));
diesel::joinable!(accounts -> currencies (currency_id));
diesel::joinable!(interest_logs -> accounts (account_id));

diesel::allow_tables_to_appear_in_same_query!(
    account_transactions,
    accounts,
    currencies,
    interest_logs,
    transactions,
);
