#[macro_use]
extern crate log;

mod tests {
    use core::{mem::size_of, sync::atomic::Ordering};

    use fimc_is::{
        Board, CameraControl, DmaSyncDirection, FimcIsDevice, FimcIsError, FirmwareError,
        IschainState, Osal, Pad, RequestFlags, SensorId, ShotExt, Size, VideoBuffer, VideoKind,
        WorkPool,
        interface::*,
        ischain::{AfMode, IsoMode},
        region::{IsRegion, ParamId, ParamSet, param::consts::*},
        sim::{PlatformCall, SIM_FW_INFO, SIM_FW_VERSION, SIM_SETFILE_OFFSET, SimBoard, SimEvent, SimOsal, SimPlatform},
    };

    type Device = FimcIsDevice<SimOsal, SimPlatform>;

    const BAYER_BASE: u32 = 0x8000_0000;
    const SENSOR_BASE: u32 = 0x8800_0000;
    const SCC_BASE: u32 = 0x9000_0000;
    const SCP_BASE: u32 = 0x9800_0000;
    const BUF_STRIDE: u32 = 0x10_0000;

    #[test]
    fn open_boots_firmware_and_applies_defaults() {
        let (board, dev) = open_rear();

        assert_eq!(
            board.platform.calls(),
            [
                PlatformCall::CfgGpio { channel: 0, on: true },
                PlatformCall::SensorPowerOn(0),
                PlatformCall::ClkCfg,
                PlatformCall::ClkOn,
                PlatformCall::A5Power(true),
            ]
        );
        assert_eq!(
            board.firmware.command_codes(),
            [
                HIC_OPEN_SENSOR,
                HIC_GET_SET_FILE_ADDR,
                HIC_LOAD_SET_FILE,
                HIC_SET_PARAMETER,
                HIC_PREVIEW_STILL,
            ]
        );

        let commands = board.firmware.commands();
        let region_dva = dev.ischain().region_dva().unwrap();
        assert_eq!(commands[0].param1, SensorId::Imx135.info().fw_id);
        assert_eq!(commands[0].param2, 0);
        assert_eq!(commands[0].param3, 0x10);
        assert_eq!(commands[0].param4, region_dva);
        assert_eq!(commands[2].param1, SIM_SETFILE_OFFSET);

        let all = ParamSet::all();
        assert_eq!(
            (commands[3].param1, commands[3].param2, commands[3].param3),
            (all.indexes, all.lindex, all.hindex)
        );

        let chain = dev.ischain();
        assert_eq!(
            chain.state(),
            IschainState::LOADED | IschainState::POWER_ON | IschainState::OPEN
        );
        let fw = chain.firmware_info().unwrap();
        assert_eq!(fw.info, SIM_FW_INFO);
        assert_eq!(fw.version, SIM_FW_VERSION);
        assert!(dev.interface().is_fw_ready());
        assert!(board.firmware.is_booted());
        info!("firmware {} / {}", fw.info, fw.version);
    }

    #[test]
    fn front_sensor_opens_on_its_own_channel() {
        init_log();
        let board = SimBoard::new(Board::Universal5420);
        let mut dev = board.device(SensorId::S5k6b2).unwrap();
        dev.open().unwrap();

        let open = board.firmware.commands()[0];
        assert_eq!(open.command, HIC_OPEN_SENSOR);
        assert_eq!(open.param1, SensorId::S5k6b2.info().fw_id);
        assert_eq!(open.param2, 1);
        assert_eq!(open.param3, 0x35);
        assert_eq!(
            board.platform.calls()[..2],
            [
                PlatformCall::CfgGpio { channel: 1, on: true },
                PlatformCall::SensorPowerOn(1),
            ]
        );

        assert_eq!(
            board.device(SensorId::S5k3l2).err(),
            Some(FimcIsError::InvalidArgument)
        );
    }

    #[test]
    fn close_powers_down_and_allows_reopen() {
        let (board, mut dev) = open_rear();
        board.platform.clear();
        board.firmware.clear_commands();

        dev.close().unwrap();
        assert!(!dev.is_open());
        assert_eq!(board.firmware.command_codes(), [HIC_CLOSE_SENSOR, HIC_POWER_DOWN]);
        assert_eq!(
            board.platform.calls(),
            [
                PlatformCall::A5Power(false),
                PlatformCall::ClkOff,
                PlatformCall::SensorPowerOff(0),
                PlatformCall::CfgGpio { channel: 0, on: false },
            ]
        );
        assert_eq!(board.osal.allocations(), 0);
        assert!(dev.ischain().state().is_empty());

        dev.open().unwrap();
        assert!(dev.is_open());
        assert_eq!(board.firmware.count(HIC_OPEN_SENSOR), 1);
    }

    #[test]
    fn missing_firmware_unwinds_open() {
        init_log();
        let board = SimBoard::new(Board::Universal5420);
        board.osal.remove_firmware(board.config.firmware_name);
        let mut dev = board.rear_device().unwrap();

        let err = dev.open().unwrap_err();
        assert_eq!(err, FimcIsError::Firmware(FirmwareError::NotFound));
        assert_eq!(err.errno(), -2);
        assert!(!dev.is_open());
        assert_eq!(
            board.platform.calls(),
            [
                PlatformCall::CfgGpio { channel: 0, on: true },
                PlatformCall::SensorPowerOn(0),
                PlatformCall::ClkCfg,
                PlatformCall::ClkOn,
                PlatformCall::ClkOff,
                PlatformCall::SensorPowerOff(0),
                PlatformCall::CfgGpio { channel: 0, on: false },
            ]
        );
        assert_eq!(board.osal.allocations(), 0);
        assert!(board.firmware.commands().is_empty());
    }

    #[test]
    fn silent_firmware_times_out() {
        init_log();
        let board = SimBoard::new(Board::Universal5420);
        board.firmware.mute(HIC_OPEN_SENSOR);
        let mut dev = board.rear_device().unwrap();

        let err = dev.open().unwrap_err();
        assert_eq!(err, FimcIsError::Timeout { command: HIC_OPEN_SENSOR });
        assert_eq!(err.errno(), -16);
        assert!(board.osal.get_time_us() >= board.config.timeouts.sensor_command_ms as u64 * 1000);
        assert_eq!(dev.interface().state(), InterfaceState::Idle);

        // The unwind still powers the core down.
        assert_eq!(board.firmware.command_codes(), [HIC_OPEN_SENSOR, HIC_POWER_DOWN]);
        let calls = board.platform.calls();
        assert!(calls.contains(&PlatformCall::A5Power(false)));
        assert!(calls.contains(&PlatformCall::ClkOff));
        assert_eq!(board.osal.allocations(), 0);
    }

    #[test]
    fn late_reply_does_not_answer_the_next_command() {
        let (board, dev) = open_rear();
        let itf = dev.interface().clone();
        let late = itf.stats().late_replies.load(Ordering::Relaxed);
        board.firmware.answer_late(HIC_PROCESS_START);

        assert_eq!(
            itf.process_start(0),
            Err(FimcIsError::Timeout { command: HIC_PROCESS_START })
        );
        // The stale PROCESS_START reply lands while PROCESS_STOP waits.
        assert_eq!(itf.process_stop(0), Ok(()));
        assert_eq!(itf.stats().late_replies.load(Ordering::Relaxed), late + 1);
        assert_eq!(itf.state(), InterfaceState::Idle);
    }

    #[test]
    fn busy_mailbox_keeps_the_unread_command() {
        let (board, dev) = open_rear();
        let itf = dev.interface().clone();
        board.firmware.clear_commands();
        board.firmware.stall_doorbell(true);

        assert_eq!(
            itf.process_start(0),
            Err(FimcIsError::Timeout { command: HIC_PROCESS_START })
        );
        assert!(itf.doorbell_pending());

        assert_eq!(itf.shot(0, BAYER_BASE, 0x1000, 7), Err(FimcIsError::Busy));
        let pool = itf.nblk_list(NblkClass::Shot);
        assert_eq!(pool.free_count(), pool.capacity());
        assert_eq!(itf.process_stop(0), Err(FimcIsError::Busy));
        assert_eq!(itf.state(), InterfaceState::Idle);

        board.firmware.stall_doorbell(false);
        board.osal.tick();
        assert_eq!(board.firmware.command_codes(), [HIC_PROCESS_START]);
        assert!(!itf.doorbell_pending());
    }

    #[test]
    fn rejected_setfile_fails_open() {
        init_log();
        let board = SimBoard::new(Board::Universal5420);
        board.firmware.reject(HIC_LOAD_SET_FILE, 0x20);
        let mut dev = board.rear_device().unwrap();

        let err = dev.open().unwrap_err();
        assert_eq!(
            err,
            FimcIsError::Rejected {
                command: HIC_LOAD_SET_FILE,
                code: 0x20
            }
        );
        assert_eq!(err.errno(), -5);
        assert!(!dev.is_open());
        assert_eq!(board.firmware.count(HIC_CLOSE_SENSOR), 1);
    }

    #[test]
    fn stream_commands_are_idempotent() {
        let (board, mut dev) = open_rear();

        dev.stream_on(VideoKind::Isp).unwrap();
        dev.stream_on(VideoKind::Isp).unwrap();
        dev.interface().stream_on(0).unwrap();
        assert_eq!(board.firmware.count(HIC_STREAM_ON), 1);
        assert_eq!(board.firmware.count(HIC_PROCESS_START), 1);
        assert!(dev.interface().is_streaming());
        assert!(dev.ischain().state().contains(IschainState::RUN));

        dev.stream_off(VideoKind::Isp).unwrap();
        dev.stream_off(VideoKind::Isp).unwrap();
        dev.interface().stream_off(0).unwrap();
        assert_eq!(board.firmware.count(HIC_STREAM_OFF), 1);
        assert_eq!(board.firmware.count(HIC_PROCESS_STOP), 1);
        assert!(!dev.interface().is_streaming());
    }

    #[test]
    fn stream_on_needs_an_open_device() {
        init_log();
        let board = SimBoard::new(Board::Universal5420);
        let mut dev = board.rear_device().unwrap();
        assert_eq!(dev.stream_on(VideoKind::Isp), Err(FimcIsError::InvalidState));
        assert_eq!(
            dev.s_ctrl(CameraControl::Iso(IsoMode::Auto)),
            Err(FimcIsError::InvalidState)
        );
    }

    #[test]
    fn shot_completes_through_scaler_and_meta_done() {
        let (board, mut dev) = open_rear();
        queue_outputs(&mut dev, VideoKind::Scp, 2);
        dev.stream_on(VideoKind::Scp).unwrap();
        dev.stream_on(VideoKind::Isp).unwrap();

        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::SCP));
        assert_eq!(dev.ischain().stats().shots, 1);

        let params = dev.ischain().params().unwrap();
        let dma = params.scalerp.dma_output;
        assert_eq!(dma.cmd, DMA_OUTPUT_COMMAND_ENABLE);
        assert_eq!(dma.buffer_number, 2);
        let memory = dev.ischain().memory().unwrap();
        let table = dev.config().shared_offsets().scp_buffers;
        assert_eq!(dma.buffer_address, memory.shared_dva(table));
        assert_eq!(memory.region().shared[table], SCP_BASE);
        assert_eq!(memory.region().shared[table + 1], SCP_BASE + BUF_STRIDE);
        let shot_dva = memory.shot_dva(0).unwrap();

        assert_eq!(pump(&board, &mut dev), 1);

        let shot = *board.firmware.commands().last().unwrap();
        assert_eq!(shot.command, HIC_SHOT);
        assert_eq!((shot.param1, shot.param2, shot.param3), (BAYER_BASE, shot_dva, 1));

        let done = dev.dqbuf(VideoKind::Isp).unwrap();
        assert_eq!(done.index, 0);
        assert_eq!(done.fcount, 1);
        assert!(!done.error);
        assert_eq!(done.shot.shot.dm.request.frame_count, 1);
        assert_eq!(done.shot.shot.dm.aa_state, 1);
        assert_eq!(done.shot.shot.uctl.scaler_ud.scp_target_address[0], SCP_BASE);

        let scp = dev.dqbuf(VideoKind::Scp).unwrap();
        assert_eq!((scp.index, scp.fcount, scp.error), (0, 1, false));
        assert!(dev.dqbuf(VideoKind::Scp).is_none());
        assert_eq!(dev.ischain().stats().frames_done, 1);

        dev.stream_off(VideoKind::Isp).unwrap();
    }

    #[test]
    fn scaler_done_for_unknown_frame_leaves_buffers_alone() {
        let (board, mut dev) = open_rear();
        queue_outputs(&mut dev, VideoKind::Scp, 2);
        dev.stream_on(VideoKind::Scp).unwrap();
        dev.stream_on(VideoKind::Isp).unwrap();
        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::SCP));
        board.osal.tick();
        dev.run_deferred_work();

        board.firmware.send_on(
            IrqClass::ScpDone,
            IsMessage::new(IHC_FRAME_DONE, 0).with_params(99, 0, 0, 0),
        );
        dev.run_deferred_work();
        assert!(dev.dqbuf(VideoKind::Scp).is_none());

        assert_eq!(pump(&board, &mut dev), 1);
        let scp = dev.dqbuf(VideoKind::Scp).unwrap();
        assert_eq!((scp.index, scp.fcount, scp.error), (0, 1, false));
        assert!(dev.dqbuf(VideoKind::Scp).is_none());

        dev.stream_off(VideoKind::Isp).unwrap();
    }

    #[test]
    fn frame_counts_follow_dispatch_order() {
        let (board, mut dev) = open_rear();
        dev.stream_on(VideoKind::Isp).unwrap();

        for index in [2, 0, 1] {
            queue_shot(&mut dev, index, ShotExt::new(RequestFlags::empty()));
        }
        assert_eq!(pump(&board, &mut dev), 3);

        let done: Vec<_> = core::iter::from_fn(|| dev.dqbuf(VideoKind::Isp))
            .map(|buf| (buf.index, buf.fcount))
            .collect();
        assert_eq!(done, [(2, 1), (0, 2), (1, 3)]);
    }

    #[test]
    fn rejected_shot_completes_with_error() {
        let (board, mut dev) = open_rear();
        dev.stream_on(VideoKind::Isp).unwrap();
        board.firmware.reject(HIC_SHOT, 0x7);

        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::empty()));
        assert_eq!(pump(&board, &mut dev), 0);

        let done = dev.dqbuf(VideoKind::Isp).unwrap();
        assert!(done.error);
        assert_eq!(done.fcount, 1);
        let stats = dev.ischain().stats();
        assert_eq!(stats.rejected_shots, 1);
        assert_eq!(stats.frames_failed, 1);
        let itf = dev.interface().stats();
        assert_eq!(itf.shot_ndone.load(core::sync::atomic::Ordering::Relaxed), 1);
        assert_eq!(dev.interface().nblk_list(NblkClass::Shot).free_count(), 3);

        dev.stream_off(VideoKind::Isp).unwrap();
    }

    #[test]
    fn shot_pool_limits_outstanding_shots() {
        let (board, mut dev) = open_rear();
        dev.stream_on(VideoKind::Isp).unwrap();
        board.firmware.hold_shots(true);

        for index in 0..5 {
            queue_shot(&mut dev, index, ShotExt::new(RequestFlags::empty()));
        }
        assert_eq!(dev.ischain().stats().shots, 3);
        let frames = dev.ischain().queue(VideoKind::Isp).unwrap().frames();
        assert_eq!(frames.counts(), [3, 2, 3, 0]);
        assert_eq!(dev.interface().nblk_list(NblkClass::Shot).free_count(), 0);

        let err = dev.interface().shot(0, BAYER_BASE, 0x1000, 99).unwrap_err();
        assert_eq!(err, FimcIsError::NoFreeWork(WorkPool::Shot));
        assert_eq!(err.errno(), -16);

        board.osal.tick();
        assert_eq!(board.firmware.release_shots(), 3);
        assert_eq!(board.firmware.complete_frames(), 3);
        dev.run_deferred_work();
        assert_eq!(dev.ischain().stats().shots, 5);

        board.osal.tick();
        assert_eq!(board.firmware.release_shots(), 2);
        assert_eq!(board.firmware.complete_frames(), 2);
        dev.run_deferred_work();

        let done: Vec<_> = core::iter::from_fn(|| dev.dqbuf(VideoKind::Isp))
            .map(|buf| (buf.index, buf.fcount, buf.error))
            .collect();
        assert_eq!(
            done,
            [(0, 1, false), (1, 2, false), (2, 3, false), (3, 4, false), (4, 5, false)]
        );
    }

    #[test]
    fn outputs_without_buffers_or_links_are_dropped() {
        let (board, mut dev) = open_rear();
        dev.stream_on(VideoKind::Isp).unwrap();

        // SCC never streamed.
        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::SCC));
        assert_eq!(dev.ischain().stats().scc_drops, 1);

        // SCP has buffers but its link is down.
        queue_outputs(&mut dev, VideoKind::Scp, 2);
        dev.stream_on(VideoKind::Scp).unwrap();
        dev.link_setup(Pad::BackSourceScalerp, None, false).unwrap();
        queue_shot(&mut dev, 1, ShotExt::new(RequestFlags::SCP));
        assert_eq!(dev.ischain().stats().scp_drops, 1);

        assert_eq!(pump(&board, &mut dev), 2);
        for _ in 0..2 {
            let done = dev.dqbuf(VideoKind::Isp).unwrap();
            assert!(!done.error);
            assert!(!done.shot.requests().intersects(RequestFlags::SCC | RequestFlags::SCP));
        }
        let scp = dev.ischain().queue(VideoKind::Scp).unwrap().frames();
        assert_eq!(scp.counts(), [6, 2, 0, 0]);

        assert_eq!(
            dev.link_setup(Pad::BackSourceScalerp, Some(Pad::SensorSource), true),
            Err(FimcIsError::InvalidArgument)
        );
    }

    #[test]
    fn dis_switch_skips_scaler_outputs() {
        let (board, mut dev) = open_rear();
        queue_outputs(&mut dev, VideoKind::Scp, 4);
        dev.stream_on(VideoKind::Scp).unwrap();
        dev.stream_on(VideoKind::Isp).unwrap();
        board.firmware.clear_commands();

        let mut shot = ShotExt::new(RequestFlags::SCP);
        shot.dis_bypass = 0;
        queue_shot(&mut dev, 0, shot);

        assert!(dev.ischain().stages().dis);
        assert_eq!(dev.ischain().skip_frames(), board.config.dis_skip_frames);
        assert_eq!(board.firmware.count(HIC_PROCESS_STOP), 1);
        assert_eq!(board.firmware.count(HIC_PROCESS_START), 1);
        let dis = dev.ischain().params().unwrap().dis.control;
        assert_eq!(dis.bypass, CONTROL_BYPASS_DISABLE);
        assert_eq!(dis.buffer_number, board.config.memory.dis_buffer_count as u32);
        let memory = dev.ischain().memory().unwrap();
        assert_eq!(
            dis.buffer_address,
            memory.shared_dva(board.config.shared_offsets().dis_buffers)
        );

        for index in 1..4 {
            queue_shot(&mut dev, index, shot);
        }
        assert_eq!(dev.ischain().stats().skipped_frames, 2);
        assert_eq!(dev.ischain().skip_frames(), 0);
        assert_eq!(pump(&board, &mut dev), 4);

        let requested: Vec<_> = core::iter::from_fn(|| dev.dqbuf(VideoKind::Isp))
            .map(|buf| buf.shot.requests().contains(RequestFlags::SCP))
            .collect();
        assert_eq!(requested, [true, false, false, true]);

        let scp: Vec<_> = core::iter::from_fn(|| dev.dqbuf(VideoKind::Scp))
            .map(|buf| buf.fcount)
            .collect();
        assert_eq!(scp, [1, 4]);
    }

    #[test]
    fn feature_switch_restarts_a_running_stream() {
        let (board, mut dev) = open_rear();
        dev.stream_on(VideoKind::Isp).unwrap();
        board.firmware.clear_commands();

        dev.s_ctrl(CameraControl::Tdnr(true)).unwrap();
        assert_eq!(
            board.firmware.command_codes(),
            [HIC_STREAM_OFF, HIC_SET_PARAMETER, HIC_PREVIEW_STILL, HIC_STREAM_ON]
        );
        assert!(dev.ischain().stages().tdnr);
        assert!(dev.interface().is_streaming());

        let tdnr = dev.ischain().params().unwrap().tdnr;
        assert_eq!(tdnr.control.bypass, CONTROL_BYPASS_DISABLE);
        assert_eq!(tdnr.control.buffer_number, board.config.memory.tdnr_buffer_count as u32);
        assert_eq!(tdnr.frame.cmd, TDNR_1ST_FRAME_COMMAND_NOPROCESSING);

        dev.s_ctrl(CameraControl::Tdnr(false)).unwrap();
        assert!(!dev.ischain().stages().tdnr);
        dev.stream_off(VideoKind::Isp).unwrap();
    }

    #[test]
    fn controls_write_their_parameter_blocks() {
        let (board, mut dev) = open_rear();
        board.firmware.clear_commands();

        dev.s_ctrl(CameraControl::Iso(IsoMode::Manual(400))).unwrap();
        let commands = board.firmware.commands();
        assert_eq!(commands[0].command, HIC_SET_PARAMETER);
        assert_eq!(commands[1].command, HIC_PREVIEW_STILL);
        let mut expected = ParamSet::new();
        expected.mark(ParamId::IspIso);
        assert_eq!(
            (commands[0].param1, commands[0].param2, commands[0].param3),
            (expected.indexes, expected.lindex, expected.hindex)
        );
        let iso = dev.ischain().params().unwrap().isp.iso;
        assert_eq!((iso.cmd, iso.value), (ISP_ISO_COMMAND_MANUAL, 400));

        assert_eq!(
            dev.s_ctrl(CameraControl::AfMode(AfMode::Touch { x: 5000, y: 10 })),
            Err(FimcIsError::InvalidArgument)
        );
        dev.s_ctrl(CameraControl::AfMode(AfMode::Touch { x: 100, y: 200 })).unwrap();
        let aa = dev.ischain().params().unwrap().isp.aa;
        assert_eq!((aa.mode, aa.touch_x, aa.touch_y), (ISP_AF_MODE_TOUCH, 100, 200));

        dev.s_ctrl(CameraControl::DigitalZoom(200)).unwrap();
        let crop = dev.ischain().params().unwrap().scalerc.input_crop;
        assert_eq!(
            (crop.pos_x, crop.pos_y, crop.crop_width, crop.crop_height),
            (1036, 776, 2056, 1544)
        );
        assert_eq!(
            dev.s_ctrl(CameraControl::DigitalZoom(50)),
            Err(FimcIsError::InvalidArgument)
        );
    }

    #[test]
    fn region_is_flushed_before_every_set_parameter() {
        let (board, mut dev) = open_rear();
        queue_outputs(&mut dev, VideoKind::Scp, 2);
        dev.stream_on(VideoKind::Scp).unwrap();
        dev.stream_on(VideoKind::Isp).unwrap();
        dev.s_ctrl(CameraControl::Metering(fimc_is::ischain::Metering::Spot)).unwrap();
        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::SCP));
        pump(&board, &mut dev);

        let region_dva = dev.ischain().region_dva().unwrap() as u64;
        let flush = SimEvent::Sync {
            dva: region_dva,
            len: size_of::<IsRegion>(),
            dir: DmaSyncDirection::ToDevice,
        };
        let events = board.osal.events();
        let mut checked = 0;
        for (at, event) in events.iter().enumerate() {
            if *event != SimEvent::Command(HIC_SET_PARAMETER) {
                continue;
            }
            let last_sync = events[..at]
                .iter()
                .rev()
                .find(|event| matches!(event, SimEvent::Sync { .. }));
            assert_eq!(last_sync, Some(&flush), "set-param #{} not preceded by a flush", checked);
            checked += 1;
        }
        // open, the metering control and the SCP DMA start
        assert_eq!(checked, 3);
    }

    #[test]
    fn stream_off_waits_for_frames_in_flight() {
        let (board, mut dev) = open_rear();
        board.firmware.set_auto_complete(true);
        dev.stream_on(VideoKind::Isp).unwrap();
        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::empty()));

        dev.stream_off(VideoKind::Isp).unwrap();
        let done = dev.dqbuf(VideoKind::Isp).unwrap();
        assert!(!done.error);
        assert_eq!(dev.ischain().stats().frames_done, 1);
    }

    #[test]
    fn stream_off_gives_up_on_a_stalled_firmware() {
        let (board, mut dev) = open_rear();
        dev.stream_on(VideoKind::Isp).unwrap();
        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::empty()));
        queue_shot(&mut dev, 1, ShotExt::new(RequestFlags::empty()));
        board.firmware.hold_shots(true);

        let start = board.osal.get_time_us();
        let err = dev.stream_off(VideoKind::Isp).unwrap_err();
        assert_eq!(err, FimcIsError::Timeout { command: HIC_SHOT });
        assert!(board.osal.get_time_us() - start >= board.config.timeouts.isp_drain_ms as u64 * 1000);
        assert_eq!(board.firmware.count(HIC_STREAM_OFF), 1);
        assert_eq!(board.firmware.count(HIC_PROCESS_STOP), 1);

        for _ in 0..2 {
            assert!(dev.dqbuf(VideoKind::Isp).unwrap().error);
        }
        assert_eq!(dev.ischain().stats().frames_failed, 2);
        assert!(!dev.ischain().state().contains(IschainState::RUN));
    }

    #[test]
    fn failed_scaler_dma_marks_the_buffer() {
        let (board, mut dev) = open_rear();
        queue_outputs(&mut dev, VideoKind::Scc, 2);
        dev.stream_on(VideoKind::Scc).unwrap();
        dev.stream_on(VideoKind::Isp).unwrap();
        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::SCC));

        board.osal.tick();
        assert!(board.firmware.fail_frame());
        dev.run_deferred_work();

        let scc = dev.dqbuf(VideoKind::Scc).unwrap();
        assert_eq!(scc.fcount, 1);
        assert!(scc.error);
        assert!(!dev.dqbuf(VideoKind::Isp).unwrap().error);
    }

    #[test]
    fn firmware_messages_update_statistics() {
        let (board, mut dev) = open_rear();

        board.firmware.send(IsMessage::new(IHC_AA_DONE, 0).with_params(1, 0, 0, 0));
        board.firmware.send(IsMessage::new(IHC_SET_FACE_MARK, 0).with_params(2, 7, 0, 0));
        board.firmware.send(IsMessage::new(IHC_NOT_READY, 0));
        board.firmware.send(IsMessage::new(0x1234, 0));
        // A reply nobody waits for is only counted.
        board.firmware.send(IsMessage::new(ISR_DONE, 0).with_params(HIC_PROCESS_START, 0, 0, 0));

        assert_eq!(dev.run_deferred_work(), 4);
        let stats = dev.ischain().stats();
        assert_eq!(stats.aa_done, 1);
        assert_eq!(stats.face_marks, 1);
        assert_eq!(stats.not_ready, 1);
        assert_eq!(stats.unknown_messages, 1);
        let late = dev.interface().stats().late_replies.load(core::sync::atomic::Ordering::Relaxed);
        assert_eq!(late, 1);
    }

    #[test]
    fn set_format_reconfigures_the_chain() {
        let (board, mut dev) = open_rear();
        board.firmware.clear_commands();

        dev.set_format(VideoKind::Scp, Size::new(1920, 1080)).unwrap();
        assert_eq!(dev.ischain().sizes().chain3, Size::new(1920, 1080));
        assert_eq!(board.firmware.command_codes(), [HIC_SET_PARAMETER, HIC_PREVIEW_STILL]);
        let crop = dev.ischain().params().unwrap().scalerp.input_crop;
        assert_eq!((crop.crop_width, crop.crop_height), (4128, 2320));

        assert_eq!(
            dev.set_format(VideoKind::Scp, Size::new(1921, 1080)),
            Err(FimcIsError::InvalidArgument)
        );
        assert_eq!(dev.ischain().sizes().chain3, Size::new(1920, 1080));
    }

    #[test]
    fn rejected_sensor_format_keeps_the_old_size() {
        let (board, mut dev) = open_rear();
        let previous = dev.sensor().size();
        let chain = dev.ischain().sizes();
        board.firmware.reject(HIC_SET_PARAMETER, 0x11);

        assert!(dev.set_format(VideoKind::Sensor, Size::new(1920, 1080)).is_err());
        assert_eq!(dev.sensor().size(), previous);
        assert_eq!(dev.ischain().sizes(), chain);
        assert_eq!(dev.ischain().sizes().chain0, previous);

        board.firmware.clear_faults();
        dev.set_format(VideoKind::Sensor, Size::new(1920, 1080)).unwrap();
        assert_eq!(dev.sensor().size(), Size::new(1920, 1080));
        assert_eq!(dev.ischain().sizes().chain0, Size::new(1920, 1080));
    }

    #[test]
    fn bayer_capture_alternates_slots() {
        let (board, mut dev) = open_rear();
        queue_outputs(&mut dev, VideoKind::Sensor, 4);
        dev.stream_on(VideoKind::Sensor).unwrap();
        assert_eq!(board.flite.slots(), [SENSOR_BASE, SENSOR_BASE + BUF_STRIDE]);

        assert!(board.flite.frame_end());
        dev.flite_irq();
        assert_eq!(board.flite.slots(), [SENSOR_BASE + 2 * BUF_STRIDE, SENSOR_BASE + BUF_STRIDE]);
        let first = dev.dqbuf(VideoKind::Sensor).unwrap();
        assert_eq!((first.index, first.error), (0, false));

        assert!(board.flite.frame_end());
        dev.flite_irq();
        assert_eq!(
            board.flite.slots(),
            [SENSOR_BASE + 2 * BUF_STRIDE, SENSOR_BASE + 3 * BUF_STRIDE]
        );

        // Nothing left to arm slot 0 with.
        assert!(board.flite.frame_end());
        dev.flite_irq();
        assert_eq!(board.flite.slots()[0], 0);
        assert_eq!(dev.sensor().flite().stats().drops, 1);

        dev.stream_off(VideoKind::Sensor).unwrap();
        assert!(!board.flite.is_capturing());
        let rest: Vec<_> = core::iter::from_fn(|| dev.dqbuf(VideoKind::Sensor))
            .map(|buf| (buf.index, buf.error))
            .collect();
        assert_eq!(rest, [(1, false), (2, false), (3, true)]);
        let stats = dev.sensor().flite().stats();
        assert_eq!((stats.frames, stats.forced_stops), (3, 0));
    }

    #[test]
    fn stuck_capture_is_forced_off() {
        let (board, mut dev) = open_rear();
        board.flite.set_stuck(true);
        queue_outputs(&mut dev, VideoKind::Sensor, 2);
        dev.stream_on(VideoKind::Sensor).unwrap();

        let start = board.osal.get_time_us();
        dev.stream_off(VideoKind::Sensor).unwrap();
        let timeouts = &board.config.timeouts;
        let min = (timeouts.flite_last_capture_ms + timeouts.flite_force_stop_delay_ms) as u64 * 1000;
        assert!(board.osal.get_time_us() - start >= min);
        assert_eq!(dev.sensor().flite().stats().forced_stops, 1);

        for _ in 0..2 {
            assert!(dev.dqbuf(VideoKind::Sensor).unwrap().error);
        }
    }

    #[test]
    fn close_stops_every_stream() {
        let (board, mut dev) = open_rear();
        board.firmware.set_auto_complete(true);
        queue_outputs(&mut dev, VideoKind::Sensor, 2);
        dev.stream_on(VideoKind::Sensor).unwrap();
        dev.stream_on(VideoKind::Isp).unwrap();
        queue_shot(&mut dev, 0, ShotExt::new(RequestFlags::empty()));

        dev.close().unwrap();
        assert!(!board.flite.is_capturing());
        assert!(!dev.interface().is_streaming());
        assert_eq!(board.firmware.count(HIC_STREAM_OFF), 1);
        assert_eq!(board.firmware.count(HIC_POWER_DOWN), 1);
        assert_eq!(board.osal.allocations(), 0);
    }

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn open_rear() -> (SimBoard, Device) {
        init_log();
        let board = SimBoard::new(Board::Universal5420);
        let mut dev = board.rear_device().unwrap();
        dev.open().unwrap();
        (board, dev)
    }

    /// Let the firmware take the last doorbell, finish every accepted shot
    /// and run the deferred work. Returns the frames finished.
    fn pump(board: &SimBoard, dev: &mut Device) -> usize {
        board.osal.tick();
        let done = board.firmware.complete_frames();
        dev.run_deferred_work();
        done
    }

    fn queue_shot(dev: &mut Device, index: usize, shot: ShotExt) {
        let buf = VideoBuffer::new(index, BAYER_BASE + index as u32 * BUF_STRIDE).with_shot(shot);
        dev.qbuf(VideoKind::Isp, &buf).unwrap();
    }

    fn queue_outputs(dev: &mut Device, kind: VideoKind, count: usize) {
        let base = match kind {
            VideoKind::Sensor => SENSOR_BASE,
            VideoKind::Scc => SCC_BASE,
            VideoKind::Scp => SCP_BASE,
            VideoKind::Isp => BAYER_BASE,
        };
        for index in 0..count {
            dev.qbuf(kind, &VideoBuffer::new(index, base + index as u32 * BUF_STRIDE))
                .unwrap();
        }
    }
}
