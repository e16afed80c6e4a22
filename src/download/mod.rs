//! 下载流程编排：计划、抓取循环、检查点与输出落盘。

pub mod checkpoint;
pub mod engine;
pub mod models;
pub mod plan;
pub mod writer;
