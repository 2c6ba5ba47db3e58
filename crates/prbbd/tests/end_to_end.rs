use std::sync::Arc;

use prbbd::{
    Bio, DispatchMode, Driver, IoStatus, LocalBlockLayer, Request, ReservedRam, StartupQueue,
    TransferError,
};
use proptest::prelude::*;

const RAM_BASE: u64 = 0x100_0000;
const RAM_SIZE: u64 = 0x20_0000;

fn start(entries: &[&str], mode: DispatchMode) -> (ReservedRam, Arc<LocalBlockLayer>, Driver) {
    let ram = ReservedRam::new(RAM_BASE, RAM_SIZE).unwrap();
    let host = Arc::new(LocalBlockLayer::new());
    let mut queue = StartupQueue::new();
    for entry in entries {
        queue.push(entry).unwrap();
    }
    let driver = Driver::init(&mut queue, Arc::new(ram.clone()), host.clone(), mode).unwrap();
    (ram, host, driver)
}

#[test]
fn single_device_publishes_2048_sectors() {
    for mode in [DispatchMode::Bio, DispatchMode::Request] {
        let (ram, host, driver) = start(&["test,0x1000000,0x100000"], mode);

        let disk = host.find_disk("test").unwrap();
        assert_eq!(disk.capacity, 2048);
        assert_eq!(disk.first_minor, 0);
        assert_eq!(disk.minors, 16);
        assert_eq!(disk.geometry.cylinders, 32);
        assert_eq!(disk.major, driver.major());

        let dev = driver.registry().find("test").unwrap();
        assert_eq!(dev.mode(), mode);

        let pattern: Vec<u8> = (0..512).map(|i| (i % 251) as u8).collect();
        let done = dev.submit_bio(Bio::write(0, vec![pattern.clone()]));
        assert_eq!(done.status(), Some(IoStatus::Ok));
        let back = dev.submit_bio(Bio::read(0, [512]));
        assert_eq!(back.status(), Some(IoStatus::Ok));
        assert_eq!(back.data(), pattern);

        // The bytes really live at the configured physical address.
        let mut phys = vec![0u8; 512];
        ram.read_physical(0x100_0000, &mut phys).unwrap();
        assert_eq!(phys, pattern);

        let last = dev.submit_bio(Bio::write(2047, vec![vec![0x11; 512]]));
        assert_eq!(last.status(), Some(IoStatus::Ok));
        let beyond = dev.submit_bio(Bio::write(2048, vec![vec![0x22; 512]]));
        assert_eq!(beyond.status(), Some(IoStatus::IoError));
        let last = dev.submit_bio(Bio::read(2047, [512]));
        assert_eq!(last.data(), vec![0x11; 512]);

        assert_eq!(
            prbbd::transfer(dev, 2048, 1, prbbd::Buffer::Write(&[0u8; 512])),
            Err(TransferError::OutOfRange {
                offset: 0x10_0000,
                len: 512,
                capacity: 0x10_0000,
            })
        );

        driver.shutdown();
        assert!(host.published().is_empty());
        assert_eq!(host.live_queues(), 0);
        assert_eq!(ram.mapped_regions(), 0);
    }
}

#[test]
fn devices_share_the_window_without_overlap() {
    let (ram, host, driver) = start(
        &["a,0x1000000,512k", "b,0x1080000,0x80000", "c,0104000000,4K"],
        DispatchMode::Bio,
    );
    let minors: Vec<_> = host.published().iter().map(|d| d.first_minor).collect();
    assert_eq!(minors, [0, 16, 32]);

    let reg = driver.registry();
    for (i, dev) in reg.iter().enumerate() {
        let fill = vec![i as u8 + 1; 512];
        let done = dev.submit_bio(Bio::write(dev.capacity() - 1, vec![fill]));
        assert_eq!(done.status(), Some(IoStatus::Ok));
    }
    for (i, dev) in reg.iter().enumerate() {
        let read = dev.submit_bio(Bio::read(dev.capacity() - 1, [512]));
        assert_eq!(read.data(), vec![i as u8 + 1; 512], "{}", dev.name());
    }

    let mut end_of_a = [0u8; 1];
    ram.read_physical(0x108_0000 - 1, &mut end_of_a).unwrap();
    assert_eq!(end_of_a, [1]);
}

#[test]
fn multi_chunk_request_with_a_bad_tail_reports_error_but_keeps_good_chunks() {
    let (_ram, _host, driver) = start(&["rq,0x1000000,0x1000"], DispatchMode::Request);
    let dev = driver.registry().find("rq").unwrap();
    assert_eq!(dev.capacity(), 8);

    let done = dev.submit_bio(Bio::write(6, vec![vec![4; 1024], vec![5; 512]]));
    assert_eq!(done.status(), Some(IoStatus::IoError));

    let read = dev.submit_bio(Bio::read(6, [1024]));
    assert_eq!(read.status(), Some(IoStatus::Ok));
    assert_eq!(read.data(), vec![4; 1024]);
}

#[test]
fn huge_start_sectors_fail_in_both_modes() {
    for mode in [DispatchMode::Bio, DispatchMode::Request] {
        let (_ram, _host, driver) = start(&["edge,0x1000000,0x1000"], mode);
        let dev = driver.registry().find("edge").unwrap();

        for sector in [u64::MAX, u64::MAX - 1, u64::MAX / 512, u64::MAX / 512 + 1] {
            let write = dev.submit_bio(Bio::write(
                sector,
                vec![vec![1; 512], vec![2; 1024], vec![3; 512]],
            ));
            assert_eq!(write.status(), Some(IoStatus::IoError), "{mode} write at {sector:#x}");

            let read = dev.submit_bio(Bio::read(sector, [512, 512]));
            assert_eq!(read.status(), Some(IoStatus::IoError), "{mode} read at {sector:#x}");
            assert_eq!(read.data(), vec![0; 1024]);
        }

        // The device is still usable and untouched afterwards.
        let all = dev.submit_bio(Bio::read(0, [0x1000]));
        assert_eq!(all.status(), Some(IoStatus::Ok));
        assert!(all.data().iter().all(|&b| b == 0), "{mode}");
    }
}

#[test]
fn queued_requests_near_the_sector_limit_all_complete() {
    let (_ram, _host, driver) = start(&["edge,0x1000000,0x1000"], DispatchMode::Request);
    let dev = driver.registry().find("edge").unwrap();

    let done = dev.submit_requests([
        Request::fs(Bio::write(u64::MAX, vec![vec![1; 512], vec![2; 512]])),
        Request::fs(Bio::write(0, vec![vec![9; 512]])),
        Request::fs(Bio::read(u64::MAX - 1, [512, 512, 512])),
    ]);
    let statuses: Vec<_> = done.iter().map(Request::status).collect();
    assert_eq!(
        statuses,
        [
            Some(IoStatus::IoError),
            Some(IoStatus::Ok),
            Some(IoStatus::IoError),
        ]
    );

    let first = dev.submit_bio(Bio::read(0, [512]));
    assert_eq!(first.data(), vec![9; 512]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn any_in_range_transfer_round_trips(
        sector in 0u64..2048,
        nsect in 1u64..16,
        seed in any::<u8>(),
        request_mode in any::<bool>(),
    ) {
        prop_assume!(sector + nsect <= 2048);
        let mode = if request_mode { DispatchMode::Request } else { DispatchMode::Bio };
        let (_ram, _host, driver) = start(&["p,0x1000000,0x100000"], mode);
        let dev = driver.registry().find("p").unwrap();

        let data: Vec<u8> = (0..nsect * 512).map(|i| (i as u8).wrapping_add(seed)).collect();
        let segments = data.chunks(512).map(<[u8]>::to_vec).collect::<Vec<_>>();
        let done = dev.submit_bio(Bio::write(sector, segments));
        prop_assert_eq!(done.status(), Some(IoStatus::Ok));

        let read = dev.submit_bio(Bio::read(sector, [data.len()]));
        prop_assert_eq!(read.status(), Some(IoStatus::Ok));
        prop_assert_eq!(read.data(), data);
    }
}
