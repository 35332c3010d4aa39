// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment configuration tests for ropc-client.

use std::time::Duration;

use ropc_client::{ClientConfig, ClientError};
use serial_test::serial;

const VARS: &[&str] = &[
    "ROPC_BASE_URI",
    "ROPC_CONNECT_TIMEOUT_MS",
    "ROPC_REQUEST_TIMEOUT_MS",
    "ROPC_MAX_GET_QUERY_LENGTH",
    "ROPC_MAX_RESPONSE_BYTES",
    "ROPC_INCLUDE_EXCEPTION_DETAILS",
];

fn clear_env() {
    for var in VARS {
        // SAFETY: tests touching the environment are serialized.
        unsafe { std::env::remove_var(var) };
    }
}

fn set_env(name: &str, value: &str) {
    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::set_var(name, value) };
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    let config = ClientConfig::from_env().unwrap();
    assert_eq!(config.base_uri, "http://127.0.0.1:8080/services");
    assert_eq!(config.connect_timeout, Duration::from_secs(10));
    assert_eq!(config.request_timeout, Duration::from_secs(30));
    assert_eq!(config.max_get_query_length, 2048);
    assert!(!config.include_exception_details);
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    set_env("ROPC_BASE_URI", "https://crm.example.com/Crm.svc");
    set_env("ROPC_CONNECT_TIMEOUT_MS", "2500");
    set_env("ROPC_REQUEST_TIMEOUT_MS", "90000");
    set_env("ROPC_MAX_GET_QUERY_LENGTH", "1024");
    set_env("ROPC_MAX_RESPONSE_BYTES", "4096");
    set_env("ROPC_INCLUDE_EXCEPTION_DETAILS", "TRUE");

    let config = ClientConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.base_uri, "https://crm.example.com/Crm.svc");
    assert_eq!(config.connect_timeout, Duration::from_millis(2500));
    assert_eq!(config.request_timeout, Duration::from_secs(90));
    assert_eq!(config.max_get_query_length, 1024);
    assert_eq!(config.max_response_size, 4096);
    assert!(config.include_exception_details);
}

#[test]
#[serial]
fn test_from_env_rejects_bad_number() {
    clear_env();
    set_env("ROPC_MAX_GET_QUERY_LENGTH", "lots");
    let result = ClientConfig::from_env();
    clear_env();

    assert!(matches!(
        result,
        Err(ClientError::Config(msg)) if msg.contains("ROPC_MAX_GET_QUERY_LENGTH")
    ));
}

#[test]
#[serial]
fn test_from_env_rejects_bad_uri() {
    clear_env();
    set_env("ROPC_BASE_URI", "ftp://files.example.com");
    let result = ClientConfig::from_env();
    clear_env();

    assert!(matches!(result, Err(ClientError::Config(_))));
}
