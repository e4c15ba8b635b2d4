//! Quick benchmark of binding throughput with a warm plan cache

use std::time::Instant;

use apibind::{bind_record, Binder};
use http::Request;

#[derive(Debug, Default)]
struct Query {
    page: u32,
    per_page: u32,
    sort: String,
}

bind_record!(Query {
    page => "query:'page'; required",
    per_page => "query:'per_page'",
    sort => "query:'sort'",
});

#[derive(Debug, Default)]
struct Create {
    id: u64,
    token: String,
    title: String,
    tags: Vec<String>,
    body: String,
}

bind_record!(Create {
    id => "path; required",
    token => "header:'X-Token'; required",
    title => "body; vd: len($) > 0",
    tags => "",
    body => "raw_body",
});

fn run<F: FnMut()>(label: &str, iterations: u32, mut f: F) {
    let start = Instant::now();
    for _ in 0..iterations {
        f();
    }
    let elapsed = start.elapsed();
    let per_op = elapsed / iterations;
    println!("{label:<36} {iterations:>8} iters  {per_op:>10.2?}/op");
}

fn main() {
    let binder = Binder::new();

    let query_req = Request::builder()
        .uri("/items?page=2&per_page=50&sort=name")
        .body(Vec::<u8>::new())
        .unwrap();

    let create_req = Request::builder()
        .uri("/items/17")
        .header("content-type", "application/json")
        .header("X-Token", "abc")
        .body(br#"{"title": "hello", "tags": ["a", "b", "c"]}"#.to_vec())
        .unwrap();
    let params = [("id", "17")];

    println!("Binding Performance Test");
    println!("========================\n");

    // Warm up the plan cache
    binder
        .bind(&mut Query::default(), &query_req, &())
        .unwrap();
    binder
        .bind_and_validate(&mut Create::default(), &create_req, &params)
        .unwrap();

    run("query-only bind", 100_000, || {
        let mut q = Query::default();
        binder.bind(&mut q, &query_req, &()).unwrap();
    });

    run("mixed sources bind_and_validate", 100_000, || {
        let mut c = Create::default();
        binder
            .bind_and_validate(&mut c, &create_req, &params)
            .unwrap();
    });

    run("cached plan lookup", 1_000_000, || {
        let _ = binder.plan::<Create>().unwrap();
    });

    println!("\nCached plans: {}", binder.cached_plans());
}
