mod messenger;
mod wire;
