// 该文件是 Hongdeng （红灯哨兵） 项目的一部分。
// src/task.rs - 帧处理任务循环
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::mpsc::{self, Receiver};
use std::{thread, time::Duration};

use tracing::{info, warn};

use crate::{frame::Frame, session::Session};

pub trait Task<I>: Sized {
  type Error;
  fn run_task(self, input: I, session: &mut Session) -> Result<(), Self::Error>;
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 安装 Ctrl-C 处理，收到中断后结束循环
  pub fn with_interrupt_handler(mut self) -> Self {
    self.handle_interrupt = true;
    self
  }

  fn install_interrupt_handler(&self) -> Option<Receiver<()>> {
    if !self.handle_interrupt {
      return None;
    }

    let (tx, rx) = mpsc::channel();
    let installed = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    });

    match installed {
      Ok(()) => Some(rx),
      Err(e) => {
        warn!("设置 Ctrl-C 处理失败: {}", e);
        None
      }
    }
  }
}

impl<I: Iterator<Item = Frame>> Task<I> for ContinuousTask {
  type Error = anyhow::Error;

  fn run_task(self, input: I, session: &mut Session) -> Result<(), Self::Error> {
    info!("开始任务...");
    let interrupt = self.install_interrupt_handler();

    let mut frame_index = 0;
    for frame in input {
      frame_index += 1;
      let now = std::time::Instant::now();
      let snapshot = session.process_frame(&frame)?;
      info!(
        "第 {} 帧处理完成，耗时: {:.2?}，{}，车辆 {}，闯红灯 {} ({:.2}%)",
        frame_index,
        now.elapsed(),
        snapshot.light_status,
        snapshot.total_vehicles_seen,
        snapshot.red_light_runner_count,
        snapshot.run_rate
      );

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    session.close();
    let counters = session.counters();
    info!(
      "任务完成，退出: 共 {} 帧，车辆 {}，闯红灯 {}",
      session.frame_count(),
      counters.total_vehicles_seen,
      counters.red_light_runner_count
    );
    Ok(())
  }
}
