//! Concurrency tests for the shared plan cache

use std::sync::{Arc, Barrier};
use std::thread;

use apibind::{bind_record, Binder};
use http::Request;

#[derive(Debug, Default)]
struct Ticket {
    id: u64,
    owner: String,
    note: String,
}

bind_record!(Ticket {
    id => "path; required",
    owner => "header:'X-Owner'",
    note => "",
});

#[derive(Debug, Default)]
struct Other {
    flag: bool,
}

bind_record!(Other {
    flag => "query",
});

const THREADS: usize = 16;

#[test]
fn test_first_time_racers_share_one_plan() {
    let binder = Binder::new();
    let barrier = Barrier::new(THREADS);

    let plans: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    binder.plan::<Ticket>().unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Racers may each build, but only one plan survives.
    let retained = binder.plan::<Ticket>().unwrap();
    assert_eq!(binder.cached_plans(), 1);
    for plan in &plans {
        assert!(Arc::ptr_eq(plan, &retained));
    }
    assert!(Arc::ptr_eq(&retained, &binder.plan::<Ticket>().unwrap()));
}

#[test]
fn test_concurrent_binds_are_independent() {
    let binder = Binder::new();

    thread::scope(|s| {
        for i in 0..THREADS {
            let binder = &binder;
            s.spawn(move || {
                for round in 0..50u64 {
                    let id = (i as u64) * 1000 + round;
                    let req = Request::builder()
                        .uri(format!("/tickets/{id}?note=n{id}&flag=true"))
                        .header("X-Owner", format!("owner-{i}"))
                        .body(Vec::<u8>::new())
                        .unwrap();
                    let params = [("id", id.to_string())];

                    let mut ticket = Ticket::default();
                    binder.bind(&mut ticket, &req, &params).unwrap();
                    assert_eq!(ticket.id, id);
                    assert_eq!(ticket.owner, format!("owner-{i}"));
                    assert_eq!(ticket.note, format!("n{id}"));

                    let mut other = Other::default();
                    binder.bind(&mut other, &req, &()).unwrap();
                    assert!(other.flag);
                }
            });
        }
    });

    assert_eq!(binder.cached_plans(), 2);
}

#[test]
fn test_binder_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Binder>();
}
