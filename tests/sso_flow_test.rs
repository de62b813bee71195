// End-to-end SSO scenarios on virtual time.
//
// These mirror the original front-door test: two applications deployed
// behind one virtual server, a 20s session idle timeout with a 2s reap
// cycle, and a 10s SSO inactivity window with its own 2s reap cycle.
// Instead of real polling and sleeping, the clock is advanced second by
// second and the sweeps run at exactly the instants the scheduler
// would, which makes every timing assertion deterministic.


use std::collections::HashMap;

use test_utils::{TestHarness, assert_stores_consistent, build_harness, scenario_config};
use vestibule::reaper::{reap_sessions, reap_sso_records};
use vestibule::{AppId, AuthDecision, Clock, Principal, SessionId, SsoId};

const APP1: &str = "app1";
const APP2: &str = "app2";

/// Cookie jar: one session reference per application plus the shared
/// cross-application SSO reference, exactly what the external
/// dispatcher would carry for a browser.
#[derive(Default)]
struct Browser {
    session_cookies: HashMap<String, SessionId>,
    sso_cookie: Option<SsoId>,
}

impl Browser {
    /// One request against `app`. Updates the cookie jar the way the
    /// dispatcher would: a minted session id replaces the stale one.
    async fn call(&mut self, h: &TestHarness, app: &str) -> bool {
        let decision = h
            .ctx
            .gate
            .authenticate(
                &AppId::new(app),
                self.session_cookies.get(app),
                self.sso_cookie.as_ref(),
            )
            .await;
        match decision {
            AuthDecision::Authenticated { session_id, .. } => {
                self.session_cookies.insert(app.to_string(), session_id);
                true
            }
            AuthDecision::NeedsLogin => false,
        }
    }

    async fn login(&mut self, h: &TestHarness, app: &str) {
        let session_id = h
            .ctx
            .coordinator
            .login(&Principal::new("user"), "changeit", &AppId::new(app))
            .await
            .expect("login succeeds");
        let session = h.ctx.sessions.get(&session_id).await.unwrap();
        self.sso_cookie = session.sso_id;
        self.session_cookies.insert(app.to_string(), session_id);
    }
}

/// Run both reaper sweeps, the way the scheduler fires them.
async fn tick_reapers(h: &TestHarness) {
    let now_ms = h.ctx.clock.now_ms();
    reap_sessions(&h.ctx.sessions, &h.ctx.sso, now_ms).await;
    reap_sso_records(&h.ctx.sessions, &h.ctx.sso, now_ms).await;
}

/// Login on app1, then poll app2 every 10 seconds. Every poll must stay
/// authenticated far past any single timeout in isolation, because each
/// touch keeps the shared SSO record (and transitively app2's session)
/// alive. After polling stops, everything must drain.
#[tokio::test]
async fn app2_outlives_every_individual_timeout_while_polled() {
    let h = build_harness(scenario_config());
    let mut browser = Browser::default();

    browser.login(&h, APP1).await;
    let app1_session = browser.session_cookies.get(APP1).cloned().unwrap();

    // 20+2+10+2 = 34s is the point where, without activity propagation,
    // some timeout chain would have to have fired; polling runs to 60s.
    for sec in 0u64..=60 {
        h.clock.set_ms(sec * 1_000);

        if sec % 2 == 0 {
            tick_reapers(&h).await;
            assert_stores_consistent(&h.ctx).await;
        }

        if sec % 10 == 0 {
            assert!(
                browser.call(&h, APP2).await,
                "app2 was forced to re-login at t={sec}s"
            );
        }
    }

    // Independent clocks: app1's own session idled out and was reaped
    // long ago, while the SSO record polled through app2 lives on.
    assert!(h.ctx.sessions.get(&app1_session).await.is_none());
    assert!(h.ctx.sso.get(browser.sso_cookie.as_ref().unwrap()).await.is_some());

    // One login total: every app2 request was either a session touch or
    // a transparent reauthentication, never a credential check.
    assert_eq!(h.realm.verification_count(), 1);

    // Stop polling. Within max_inactive + reap interval the record is
    // purged, and the purge force-removes app2's still-unexpired session.
    for sec in 61u64..=75 {
        h.clock.set_ms(sec * 1_000);
        if sec % 2 == 0 {
            tick_reapers(&h).await;
            assert_stores_consistent(&h.ctx).await;
        }
    }

    assert_eq!(h.ctx.sso.count().await, 0);
    assert_eq!(h.ctx.sessions.count().await, 0);
    assert!(!browser.call(&h, APP2).await, "everything expired: must re-login");
}

/// Visiting app2 before any login must not create an SSO binding for
/// it; after the app1 login, app2 still authenticates transparently.
#[tokio::test]
async fn prewarmed_app2_session_gains_nothing_before_login() {
    let h = build_harness(scenario_config());
    let mut browser = Browser::default();

    // The dispatcher allocates a container session for the anonymous
    // visit (the request only rendered public content / a login form).
    let prewarmed = h
        .ctx
        .sessions
        .create(
            AppId::new(APP2),
            h.ctx.config.session_idle_timeout,
            None,
            h.clock.now_ms(),
        )
        .await;
    browser
        .session_cookies
        .insert(APP2.to_string(), prewarmed.clone());

    assert!(!browser.call(&h, APP2).await, "anonymous session never authenticates");

    browser.login(&h, APP1).await;

    // The pre-login session acquired no binding from someone else's login.
    let anon = h.ctx.sessions.get(&prewarmed).await.unwrap();
    assert!(anon.sso_id.is_none());
    assert!(anon.principal.is_none());

    for sec in 0u64..=40 {
        h.clock.set_ms(sec * 1_000);
        if sec % 2 == 0 {
            tick_reapers(&h).await;
        }
        if sec % 10 == 0 {
            assert!(
                browser.call(&h, APP2).await,
                "app2 must authenticate via the shared record at t={sec}s"
            );
        }
    }

    // The anonymous session was replaced in the cookie jar on the first
    // authenticated call and reaped once it idled out.
    assert_ne!(browser.session_cookies.get(APP2), Some(&prewarmed));
    assert_eq!(h.realm.verification_count(), 1, "no second login");
}

/// Reclamation is sweep-driven: an idle session stays visible past its
/// expiry instant, but never past expiry + reap interval, and is never
/// removed early.
#[tokio::test]
async fn session_reclamation_has_a_bounded_delay() {
    let h = build_harness(scenario_config());
    let mut browser = Browser::default();
    browser.login(&h, APP1).await;
    let session_id = browser.session_cookies.get(APP1).cloned().unwrap();

    // Just inside the idle window: a sweep must not take it.
    h.clock.set_ms(20_000);
    tick_reapers(&h).await;
    assert!(h.ctx.sessions.get(&session_id).await.is_some());

    // Past expiry but before the next sweep: still visible, though a
    // touch already fails (lazy expiry on read).
    h.clock.set_ms(21_000);
    assert!(!h.ctx.sessions.touch(&session_id, h.ctx.clock.now_ms()).await);
    assert!(h.ctx.sessions.get(&session_id).await.is_some());

    // idle_timeout + reap_interval is the worst case: by the 22s sweep
    // the session is gone.
    h.clock.set_ms(22_000);
    tick_reapers(&h).await;
    assert!(h.ctx.sessions.get(&session_id).await.is_none());
    assert_stores_consistent(&h.ctx).await;
}

/// A purged SSO id is permanently invalid: no touch, no bind, no
/// transparent reauthentication, no implicit recreation.
#[tokio::test]
async fn purged_sso_record_stays_purged() {
    let h = build_harness(scenario_config());
    let mut browser = Browser::default();
    browser.login(&h, APP1).await;
    let sso_id = browser.sso_cookie.clone().unwrap();

    h.clock.set_ms(12_000);
    tick_reapers(&h).await;
    assert!(h.ctx.sso.get(&sso_id).await.is_none());

    assert!(!h.ctx.sso.touch(&sso_id, h.ctx.clock.now_ms()).await);
    assert!(matches!(
        h.ctx
            .coordinator
            .reauthenticate_via_sso(&sso_id, &AppId::new(APP2))
            .await,
        Err(vestibule::AppError::SsoInvalid(_))
    ));
    assert!(!browser.call(&h, APP2).await);

    // A fresh login starts a new record under a new id.
    browser.login(&h, APP1).await;
    assert_ne!(browser.sso_cookie.as_ref(), Some(&sso_id));
}
