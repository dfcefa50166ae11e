mod basic;
mod commands;
mod lifecycle;
mod router;
mod sessions;
