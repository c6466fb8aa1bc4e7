//! Validation benchmarks for the request validator.
//!
//! Run with: cargo bench -p palisade-validator

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use palisade_spec::parse_spec;
use palisade_validator::{RawRequest, RequestValidator};

const USERS: &str = r#"
openapi: "3.0.3"
info: { title: Users, version: "1" }
components:
  securitySchemes:
    apiKey: { type: apiKey, in: header, name: X-API-Key }
security:
  - apiKey: []
paths:
  /users:
    post:
      operationId: createUser
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [name, email]
              properties:
                name: { type: string, minLength: 1, maxLength: 100 }
                email: { type: string, format: email }
                age: { type: integer, minimum: 0, maximum: 150 }
                tags: { type: array, items: { type: string }, maxItems: 10 }
  /users/{id}:
    get:
      operationId: getUser
      parameters:
        - { name: id, in: path, required: true, schema: { type: string, format: uuid } }
        - { name: page, in: query, schema: { type: integer, minimum: 1 } }
        - { name: limit, in: query, schema: { type: integer, minimum: 1, maximum: 100 } }
"#;

fn create_validator() -> RequestValidator {
    RequestValidator::new(Arc::new(parse_spec(USERS).unwrap()))
}

fn bench_spec_loading(c: &mut Criterion) {
    c.bench_function("spec_loading", |b| {
        b.iter(|| {
            black_box(parse_spec(black_box(USERS)).unwrap());
        });
    });
}

fn bench_validator_creation(c: &mut Criterion) {
    let spec = Arc::new(parse_spec(USERS).unwrap());

    c.bench_function("validator_creation", |b| {
        b.iter(|| {
            black_box(RequestValidator::new(spec.clone()));
        });
    });
}

fn bench_parameter_validation(c: &mut Criterion) {
    let validator = create_validator();

    let valid = RawRequest::new("GET", "/users/550e8400-e29b-41d4-a716-446655440000?page=1&limit=50")
        .header("X-API-Key", "key");
    let invalid = RawRequest::new("GET", "/users/not-a-uuid?page=0&limit=1000") // Below minimum, above maximum
        .header("X-API-Key", "key");

    let mut group = c.benchmark_group("parameter_validation");

    group.bench_function("valid_params", |b| {
        b.iter(|| {
            black_box(validator.validate(&valid));
        });
    });

    group.bench_function("invalid_params", |b| {
        b.iter(|| {
            black_box(validator.validate(&invalid));
        });
    });

    group.finish();
}

fn bench_body_validation(c: &mut Criterion) {
    let validator = create_validator();

    let small_body = json!({
        "name": "John Doe",
        "email": "john@example.com"
    });

    let large_body = json!({
        "name": "John Doe",
        "email": "john@example.com",
        "age": 30,
        "tags": ["tag1", "tag2", "tag3", "tag4", "tag5"]
    });

    let invalid_body = json!({
        "name": "",
        "email": "not-an-email"
    });

    let mut group = c.benchmark_group("body_validation");

    for (name, body) in [
        ("small_valid", &small_body),
        ("large_valid", &large_body),
        ("invalid", &invalid_body),
    ] {
        let request = RawRequest::new("POST", "/users")
            .header("X-API-Key", "key")
            .json(body);

        group.bench_with_input(BenchmarkId::new("json", name), &request, |b, request| {
            b.iter(|| {
                black_box(validator.validate(request));
            });
        });
    }

    group.finish();
}

fn bench_not_found(c: &mut Criterion) {
    let validator = create_validator();
    let unknown = RawRequest::new("GET", "/accounts/42");
    let wrong_method = RawRequest::new("DELETE", "/users/42");

    let mut group = c.benchmark_group("not_found");

    group.bench_function("unknown_path", |b| {
        b.iter(|| {
            black_box(validator.validate(&unknown));
        });
    });

    group.bench_function("method_not_allowed", |b| {
        b.iter(|| {
            black_box(validator.validate(&wrong_method));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_spec_loading,
    bench_validator_creation,
    bench_parameter_validation,
    bench_body_validation,
    bench_not_found,
);
criterion_main!(benches);
