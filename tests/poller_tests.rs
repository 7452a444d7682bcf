use fileserv::config::PollerKind;
use fileserv::error::ServerError;
use fileserv::poller::{create_poller, Poller};
use std::os::unix::io::RawFd;

const KINDS: [PollerKind; 3] = [PollerKind::Select, PollerKind::Poll, PollerKind::Epoll];

fn make_pipe() -> (RawFd, RawFd) {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(ret, 0);
    (fds[0], fds[1])
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn write_byte(fd: RawFd) {
    let n = unsafe { libc::write(fd, [1u8].as_ptr() as *const libc::c_void, 1) };
    assert_eq!(n, 1);
}

fn for_each_kind(test: impl Fn(Box<dyn Poller>, u32, PollerKind)) {
    for kind in KINDS {
        let (poller, interest) = create_poller(kind).unwrap();
        test(poller, interest, kind);
    }
}

#[test]
fn insert_erase_insert_leaves_no_residual_state() {
    for_each_kind(|mut poller, interest, kind| {
        let (rd, wr) = make_pipe();
        poller.insert(rd, interest).unwrap();
        poller.erase(rd).unwrap();
        poller
            .insert(rd, interest)
            .unwrap_or_else(|e| panic!("{:?}: reinsert failed: {}", kind, e));
        assert_eq!(poller.len(), 1);
        close_fd(rd);
        close_fd(wr);
    });
}

#[test]
fn duplicate_insert_is_rejected() {
    for_each_kind(|mut poller, interest, kind| {
        let (rd, wr) = make_pipe();
        poller.insert(rd, interest).unwrap();
        match poller.insert(rd, interest) {
            Err(ServerError::DuplicateFd(fd)) => assert_eq!(fd, rd),
            other => panic!("{:?}: expected DuplicateFd, got {:?}", kind, other.err()),
        }
        assert_eq!(poller.len(), 1);
        close_fd(rd);
        close_fd(wr);
    });
}

#[test]
fn erase_absent_fd_is_a_noop() {
    for_each_kind(|mut poller, _interest, _kind| {
        poller.erase(999).unwrap();
        assert_eq!(poller.len(), 0);
    });
}

#[test]
fn wait_zero_on_idle_set_returns_nothing() {
    for_each_kind(|mut poller, interest, kind| {
        let (rd, wr) = make_pipe();
        poller.insert(rd, interest).unwrap();
        let ready = poller.wait(0).unwrap();
        assert!(ready.is_empty(), "{:?}: unexpected events {:?}", kind, ready);
        close_fd(rd);
        close_fd(wr);
    });
}

#[test]
fn wait_reports_only_the_ready_registered_fd() {
    for_each_kind(|mut poller, interest, kind| {
        let (rd_a, wr_a) = make_pipe();
        let (rd_b, wr_b) = make_pipe();
        let (rd_unregistered, wr_unregistered) = make_pipe();

        poller.insert(rd_a, interest).unwrap();
        poller.insert(rd_b, interest).unwrap();

        write_byte(wr_a);
        write_byte(wr_unregistered);

        let ready = poller.wait(1000).unwrap();
        let fds: Vec<RawFd> = ready.iter().map(|(fd, _)| *fd).collect();
        assert_eq!(fds, vec![rd_a], "{:?}", kind);

        for fd in [rd_a, wr_a, rd_b, wr_b, rd_unregistered, wr_unregistered] {
            close_fd(fd);
        }
    });
}

#[test]
fn erased_fd_is_never_reported() {
    for_each_kind(|mut poller, interest, kind| {
        let (rd, wr) = make_pipe();
        poller.insert(rd, interest).unwrap();
        write_byte(wr);
        poller.erase(rd).unwrap();

        let ready = poller.wait(0).unwrap();
        assert!(ready.is_empty(), "{:?}: got {:?}", kind, ready);
        close_fd(rd);
        close_fd(wr);
    });
}

#[test]
fn wait_with_timeout_expires() {
    for_each_kind(|mut poller, interest, _kind| {
        let (rd, wr) = make_pipe();
        poller.insert(rd, interest).unwrap();
        let start = std::time::Instant::now();
        let ready = poller.wait(50).unwrap();
        assert!(ready.is_empty());
        assert!(start.elapsed() >= std::time::Duration::from_millis(40));
        close_fd(rd);
        close_fd(wr);
    });
}

#[test]
fn clear_drops_all_registrations() {
    for_each_kind(|mut poller, interest, _kind| {
        let (rd_a, wr_a) = make_pipe();
        let (rd_b, wr_b) = make_pipe();
        poller.insert(rd_a, interest).unwrap();
        poller.insert(rd_b, interest).unwrap();
        poller.clear();
        assert_eq!(poller.len(), 0);
        assert!(poller.is_open());

        write_byte(wr_a);
        assert!(poller.wait(0).unwrap().is_empty());
        for fd in [rd_a, wr_a, rd_b, wr_b] {
            close_fd(fd);
        }
    });
}

#[test]
fn closed_poller_rejects_every_operation() {
    for_each_kind(|mut poller, interest, kind| {
        let (rd, wr) = make_pipe();
        poller.insert(rd, interest).unwrap();
        poller.close();
        assert!(!poller.is_open(), "{:?}", kind);

        assert!(matches!(
            poller.insert(rd, interest),
            Err(ServerError::PollerClosed)
        ));
        assert!(matches!(poller.erase(rd), Err(ServerError::PollerClosed)));
        assert!(matches!(
            poller.modify(rd, interest),
            Err(ServerError::PollerClosed)
        ));
        assert!(matches!(poller.wait(0), Err(ServerError::PollerClosed)));
        close_fd(rd);
        close_fd(wr);
    });
}

#[test]
fn modify_requires_registration() {
    for_each_kind(|mut poller, interest, kind| {
        let (rd, wr) = make_pipe();
        assert!(
            poller.modify(rd, interest).is_err(),
            "{:?}: modify on absent fd succeeded",
            kind
        );
        poller.insert(rd, interest).unwrap();
        poller.modify(rd, interest).unwrap();
        close_fd(rd);
        close_fd(wr);
    });
}
