mod cli;
mod shutdown;
