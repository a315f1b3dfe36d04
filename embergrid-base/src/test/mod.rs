mod bitmap256;
