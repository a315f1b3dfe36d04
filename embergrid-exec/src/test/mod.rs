mod harness;
mod scripted;
