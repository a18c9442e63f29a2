mod block_file;
mod dispatch;
mod server;

pub use self::{
    block_file::BlockFile,
    dispatch::{Flow, Rejection, dispatch},
    server::{POLL_INTERVAL, Server},
};
